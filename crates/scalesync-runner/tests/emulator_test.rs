//! End-to-end tests: `ScaleClient` over TCP against the `ScaleEmulator`.

use std::time::Duration;

use scalesync_protocol::{Recipe, RecipeStub, Step, TitleListFormat};
use scalesync_runner::{RunnerConfig, RunnerError, ScaleClient, ScaleEmulator, ScaleModel};
use scalesync_session::{ConnectionState, SessionConfig, SessionError, SessionEvent};

fn recipe(title: &str) -> Recipe {
    Recipe::new(title, vec![Step::instruction("Mix")])
}

fn stubs(titles: &[&str]) -> Vec<RecipeStub> {
    titles.iter().map(|t| RecipeStub::new(*t)).collect()
}

/// Fast pacing so transfers finish quickly in real time.
fn session_config(format: TitleListFormat) -> SessionConfig {
    SessionConfig::default()
        .with_name("it")
        .with_pacing_delay_ms(10)
        .with_probe_timeout_ms(1000)
        .with_response_timeout_ms(2000)
        .with_title_format(format)
}

async fn start(titles: &[&str], format: TitleListFormat) -> (ScaleEmulator, RunnerConfig) {
    let recipes = titles.iter().map(|t| recipe(t)).collect();
    let emulator = ScaleEmulator::bind("127.0.0.1:0", ScaleModel::new(recipes, format))
        .await
        .expect("bind emulator");
    let config = RunnerConfig::default()
        .with_address(emulator.local_addr().to_string())
        .with_session(session_config(format));
    (emulator, config)
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_connect_lists_recipes() {
    let (_emulator, config) = start(&["Soup", "Bread"], TitleListFormat::Counted).await;

    let client = ScaleClient::connect(&config).await.unwrap();
    assert_eq!(client.handle().current_recipe_list(), stubs(&["Soup", "Bread"]));
    assert_eq!(client.handle().connection_state(), ConnectionState::DeviceReady);
    client.close().await;
}

#[tokio::test]
async fn test_bare_listing_format() {
    let (_emulator, config) = start(&["Soup"], TitleListFormat::Bare).await;

    let client = ScaleClient::connect(&config).await.unwrap();
    assert_eq!(client.handle().current_recipe_list(), stubs(&["Soup"]));
    client.close().await;
}

#[tokio::test]
async fn test_connect_refused() {
    let config = RunnerConfig::default().with_address("127.0.0.1:1");
    let result = ScaleClient::connect(&config).await;
    assert!(matches!(result, Err(RunnerError::Io(_)) | Err(RunnerError::ConnectTimeout(_))));
}

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn test_add_recipe_over_tcp() {
    let (emulator, config) = start(&["Bread"], TitleListFormat::Counted).await;
    let client = ScaleClient::connect(&config).await.unwrap();

    let soup = Recipe::new(
        "Soup",
        vec![
            Step::weighted("Water", "500"),
            Step::weighted("Lentils", "200"),
            Step::instruction("Simmer 20 min"),
        ],
    );
    client.handle().request_add(soup.clone()).await.unwrap();

    assert_eq!(client.handle().current_recipe_list(), stubs(&["Bread", "Soup"]));
    assert_eq!(emulator.recipes().last(), Some(&soup));
    client.close().await;
}

#[tokio::test]
async fn test_delete_recipe_over_tcp() {
    let (emulator, config) = start(&["Soup", "Bread", "Pie"], TitleListFormat::Counted).await;
    let client = ScaleClient::connect(&config).await.unwrap();

    client.handle().request_delete(0).await.unwrap();

    assert_eq!(client.handle().current_recipe_list(), stubs(&["Bread", "Pie"]));
    assert_eq!(emulator.titles(), stubs(&["Bread", "Pie"]));
    client.close().await;
}

#[tokio::test]
async fn test_sequential_transfers() {
    let (emulator, config) = start(&[], TitleListFormat::Counted).await;
    let client = ScaleClient::connect(&config).await.unwrap();

    client.handle().request_add(recipe("One")).await.unwrap();
    client.handle().request_add(recipe("Two")).await.unwrap();
    client.handle().request_delete(0).await.unwrap();

    assert_eq!(client.handle().current_recipe_list(), stubs(&["Two"]));
    assert_eq!(emulator.titles(), stubs(&["Two"]));
    client.close().await;
}

#[tokio::test]
async fn test_title_with_field_separator_is_refused() {
    let (emulator, config) = start(&["Pie"], TitleListFormat::Bare).await;
    let client = ScaleClient::connect(&config).await.unwrap();

    let result = client.handle().request_add(recipe("Salt_Bread")).await;
    assert!(matches!(result, Err(SessionError::InvalidRecipe(_))));

    // Positions stay aligned with the device, so the delete hits the listed entry.
    client.handle().request_add(recipe("Salt Bread")).await.unwrap();
    client.handle().request_delete(0).await.unwrap();
    assert_eq!(client.handle().current_recipe_list(), stubs(&["Salt Bread"]));
    assert_eq!(emulator.titles(), stubs(&["Salt Bread"]));
    client.close().await;
}

#[tokio::test]
async fn test_full_scale_rejects_add_locally() {
    let titles = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
    let (emulator, config) = start(&titles, TitleListFormat::Counted).await;
    let client = ScaleClient::connect(&config).await.unwrap();

    let result = client.handle().request_add(recipe("Ten")).await;
    assert_eq!(result, Err(SessionError::CatalogFull { max: 9 }));
    assert_eq!(emulator.titles().len(), 9);
    client.close().await;
}

// ============================================================================
// Session End
// ============================================================================

#[tokio::test]
async fn test_scale_exit_clears_list() {
    let (emulator, config) = start(&["Soup"], TitleListFormat::Counted).await;
    let client = ScaleClient::connect(&config).await.unwrap();
    let mut events = client.handle().events();

    emulator.end_session();

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::SessionEnded) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(ended);
    assert!(client.handle().current_recipe_list().is_empty());

    client
        .handle()
        .wait_for_state(ConnectionState::Disconnected, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        client.handle().request_add(recipe("Late")).await,
        Err(SessionError::NotConnected)
    );
    client.close().await;
}

#[tokio::test]
async fn test_unsolicited_noise_is_tolerated() {
    let (emulator, config) = start(&["Soup"], TitleListFormat::Counted).await;
    let client = ScaleClient::connect(&config).await.unwrap();

    emulator.send_raw("\r\nnoise");
    client.handle().request_add(recipe("Pie")).await.unwrap();

    assert_eq!(client.handle().current_recipe_list(), stubs(&["Soup", "Pie"]));
    client.close().await;
}
