//! Scale emulator.
//!
//! [`ScaleModel`] plays the scale firmware's side of the recipe protocol with
//! no I/O; [`ScaleEmulator`] serves it over TCP, one client at a time, so the
//! CLI and the integration tests can run against something that behaves like
//! the device.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use scalesync_protocol::{
    Command, LineBuffer, Recipe, RecipeStub, Record, TitleListFormat, MAX_DEVICE_RECIPES,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

// ============================================================================
// Device Model
// ============================================================================

/// Protocol behavior of the scale.
#[derive(Debug)]
pub struct ScaleModel {
    recipes: Vec<Recipe>,
    format: TitleListFormat,
    max_recipes: usize,

    lines: LineBuffer,
    /// `CONN?` sent; the next `CONN` is its answer.
    awaiting_conn_reply: bool,
    /// Titles listing sent on this connection.
    listed: bool,
    /// `READY` sent; waiting for `TITLE_`.
    accepting: bool,
    /// Recipe being received.
    incoming: Option<Recipe>,
}

impl ScaleModel {
    pub fn new(recipes: Vec<Recipe>, format: TitleListFormat) -> Self {
        ScaleModel {
            recipes,
            format,
            max_recipes: MAX_DEVICE_RECIPES,
            lines: LineBuffer::new(),
            awaiting_conn_reply: false,
            listed: false,
            accepting: false,
            incoming: None,
        }
    }

    pub fn with_max_recipes(mut self, max: usize) -> Self {
        self.max_recipes = max;
        self
    }

    pub fn format(&self) -> TitleListFormat {
        self.format
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn titles(&self) -> Vec<RecipeStub> {
        self.recipes.iter().map(RecipeStub::from).collect()
    }

    /// A host connected: reset per-connection state and probe it.
    pub fn connect(&mut self) -> Vec<Record> {
        self.reset_link();
        self.awaiting_conn_reply = true;
        vec![Record::ConnQuery]
    }

    /// Leave edit mode.
    pub fn end_session(&mut self) -> Vec<Record> {
        self.reset_link();
        vec![Record::Exit]
    }

    /// Feed bytes from the host and collect the replies.
    pub fn receive(&mut self, data: &[u8]) -> Vec<Record> {
        self.lines.push(data);

        let mut replies = Vec::new();
        while let Some(line) = self.lines.decode_line() {
            replies.extend(self.handle_line(&line));
        }
        replies
    }

    fn reset_link(&mut self) {
        self.lines.clear();
        self.awaiting_conn_reply = false;
        self.listed = false;
        self.accepting = false;
        self.incoming = None;
    }

    fn handle_line(&mut self, line: &str) -> Option<Record> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!("Emulator: ignoring line: {}", e);
                return None;
            }
        };
        trace!("Emulator: received {:?}", command);

        match command {
            Command::Probe if self.awaiting_conn_reply => {
                self.awaiting_conn_reply = false;
                if self.listed {
                    None
                } else {
                    self.listed = true;
                    Some(Record::Titles(self.titles()))
                }
            }
            Command::Probe => {
                self.awaiting_conn_reply = true;
                Some(Record::ConnQuery)
            }

            Command::Add => {
                if self.recipes.len() >= self.max_recipes {
                    warn!("Emulator: storage full ({} recipes), ignoring ADD", self.recipes.len());
                    return None;
                }
                self.accepting = true;
                self.incoming = None;
                Some(Record::Ready)
            }

            Command::Title { title } if self.accepting => {
                self.accepting = false;
                self.incoming = Some(Recipe::new(title, Vec::new()));
                None
            }

            Command::Step(step) => {
                match self.incoming {
                    Some(ref mut recipe) => recipe.steps.push(step),
                    None => debug!("Emulator: step outside a recipe"),
                }
                None
            }

            Command::Terminator => {
                let recipe = self.incoming.take()?;
                info!(
                    "Emulator: stored '{}' ({} steps)",
                    recipe.title,
                    recipe.steps.len()
                );
                self.recipes.push(recipe);
                Some(Record::Success)
            }

            Command::Delete { index } => {
                if index >= self.recipes.len() {
                    warn!("Emulator: no recipe at position {}", index + 1);
                    return None;
                }
                let removed = self.recipes.remove(index);
                info!("Emulator: deleted '{}'", removed.title);
                Some(Record::Success)
            }

            Command::Title { title } => {
                debug!("Emulator: TITLE_{} without ADD", title);
                None
            }
        }
    }
}

// ============================================================================
// TCP Server
// ============================================================================

/// Out-of-band actions on the emulated device.
#[derive(Debug)]
enum EmulatorControl {
    EndSession,
    SendRaw(Vec<u8>),
}

/// Emulated scale reachable over TCP.
pub struct ScaleEmulator {
    local_addr: SocketAddr,
    model: Arc<Mutex<ScaleModel>>,
    control: mpsc::UnboundedSender<EmulatorControl>,
    task: JoinHandle<()>,
}

impl ScaleEmulator {
    /// Bind `addr` and start serving `model`.
    pub async fn bind(addr: &str, model: ScaleModel) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Emulator: listening on {}", local_addr);

        let model = Arc::new(Mutex::new(model));
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_listener(listener, model.clone(), control_rx));

        Ok(ScaleEmulator {
            local_addr,
            model,
            control,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Titles currently stored on the device.
    pub fn titles(&self) -> Vec<RecipeStub> {
        self.model.lock().titles()
    }

    /// Recipes currently stored on the device.
    pub fn recipes(&self) -> Vec<Recipe> {
        self.model.lock().recipes().to_vec()
    }

    /// Leave edit mode: send `EXIT` to the connected host.
    pub fn end_session(&self) {
        let _ = self.control.send(EmulatorControl::EndSession);
    }

    /// Write raw bytes to the connected host.
    pub fn send_raw(&self, data: impl Into<Vec<u8>>) {
        let _ = self.control.send(EmulatorControl::SendRaw(data.into()));
    }

    /// Wait until the server stops (it runs until aborted).
    pub async fn join(&mut self) {
        let _ = (&mut self.task).await;
    }

    /// Stop serving.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ScaleEmulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_listener(
    listener: TcpListener,
    model: Arc<Mutex<ScaleModel>>,
    mut control: mpsc::UnboundedReceiver<EmulatorControl>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            Some(action) = control.recv() => {
                debug!("Emulator: no host connected, dropping {:?}", action);
                continue;
            }
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Emulator: accept failed: {}", e);
                continue;
            }
        };
        info!("Emulator: host connected from {}", peer);

        if let Err(e) = handle_connection(stream, &model, &mut control).await {
            warn!("Emulator: connection error: {}", e);
        }
        info!("Emulator: host {} disconnected", peer);
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    model: &Mutex<ScaleModel>,
    control: &mut mpsc::UnboundedReceiver<EmulatorControl>,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 1024];

    let greeting = model.lock().connect();
    write_records(&mut writer, model, &greeting).await?;

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                let replies = model.lock().receive(&read_buf[..n]);
                write_records(&mut writer, model, &replies).await?;
            }

            Some(action) = control.recv() => match action {
                EmulatorControl::EndSession => {
                    let exit = model.lock().end_session();
                    write_records(&mut writer, model, &exit).await?;
                    return Ok(());
                }
                EmulatorControl::SendRaw(data) => {
                    writer.write_all(&data).await?;
                    writer.flush().await?;
                }
            }
        }
    }
}

async fn write_records<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    model: &Mutex<ScaleModel>,
    records: &[Record],
) -> io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let format = model.lock().format();
    for record in records {
        let text = record.encode(format);
        trace!("Emulator: sending {}", text);
        writer.write_all(text.as_bytes()).await?;
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalesync_protocol::{recipe_transfer, Step};

    fn model(titles: &[&str]) -> ScaleModel {
        let recipes = titles.iter().map(|t| Recipe::new(*t, Vec::new())).collect();
        ScaleModel::new(recipes, TitleListFormat::Counted)
    }

    #[test]
    fn test_handshake_then_listing() {
        let mut scale = model(&["Soup"]);
        assert_eq!(scale.connect(), vec![Record::ConnQuery]);

        let replies = scale.receive(b"CONN\n");
        assert_eq!(replies, vec![Record::Titles(vec![RecipeStub::new("Soup")])]);

        // A later CONN is a probe.
        assert_eq!(scale.receive(b"CONN\n"), vec![Record::ConnQuery]);
        // Its answer is swallowed.
        assert!(scale.receive(b"CONN\n").is_empty());
    }

    #[test]
    fn test_add_recipe() {
        let mut scale = model(&[]);
        scale.connect();
        scale.receive(b"CONN\n");

        assert_eq!(scale.receive(b"CONN\n"), vec![Record::ConnQuery]);
        assert_eq!(scale.receive(b"CONN\nADD\n"), vec![Record::Ready]);
        assert!(scale.receive(b"TITLE_Soup/\nWEIGHT_500_Wa").is_empty());
        assert!(scale.receive(b"ter/\nINST_Simmer/\n").is_empty());
        assert_eq!(scale.receive(b"#\n"), vec![Record::Success]);

        assert_eq!(
            scale.recipes(),
            &[Recipe::new(
                "Soup",
                vec![Step::weighted("Water", "500"), Step::instruction("Simmer")]
            )]
        );
    }

    #[test]
    fn test_add_accepts_host_encoded_records() {
        let recipe = Recipe::new(
            "Pie",
            vec![Step::weighted("Apples", "300"), Step::instruction("Bake 40 min")],
        );
        let mut scale = model(&[]);
        scale.receive(b"ADD\n");

        let wire: Vec<u8> = recipe_transfer(&recipe).iter().flat_map(Command::encode).collect();
        assert_eq!(scale.receive(&wire), vec![Record::Success]);
        assert_eq!(scale.recipes(), &[recipe]);

        // Records without the suffix are accepted too.
        scale.receive(b"ADD\n");
        scale.receive(b"TITLE_Tea\nINST_Steep\n#\n");
        assert_eq!(scale.titles().last(), Some(&RecipeStub::new("Tea")));
    }

    #[test]
    fn test_add_when_full_is_ignored() {
        let mut scale = model(&["a", "b"]).with_max_recipes(2);
        scale.connect();
        assert!(scale.receive(b"CONN\nADD\n").iter().all(|r| *r != Record::Ready));
    }

    #[test]
    fn test_delete_recipe() {
        let mut scale = model(&["Soup", "Bread", "Pie"]);
        assert_eq!(scale.receive(b"DELETE_2\n"), vec![Record::Success]);
        assert_eq!(scale.titles(), vec![RecipeStub::new("Soup"), RecipeStub::new("Pie")]);

        assert!(scale.receive(b"DELETE_9\n").is_empty());
        assert_eq!(scale.titles().len(), 2);
    }

    #[test]
    fn test_records_outside_transfer_are_ignored() {
        let mut scale = model(&[]);
        assert!(scale.receive(b"TITLE_Stray\nINST_x\n#\nHELLO\n").is_empty());
        assert!(scale.recipes().is_empty());
    }

    #[test]
    fn test_end_session() {
        let mut scale = model(&["Soup"]);
        scale.connect();
        assert_eq!(scale.end_session(), vec![Record::Exit]);
        // Per-connection state is gone: CONN is a fresh probe.
        assert_eq!(scale.receive(b"CONN\n"), vec![Record::ConnQuery]);
    }
}
