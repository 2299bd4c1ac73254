//! Recipe data types shared by the host and the scale.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum recipe title length in characters.
pub const MAX_TITLE_LEN: usize = 20;

/// Maximum step instruction length in characters.
pub const MAX_BODY_LEN: usize = 40;

/// Maximum weight length in characters.
pub const MAX_WEIGHT_LEN: usize = 3;

/// Characters the scale reserves as record and field separators.
pub const RESERVED_CHARS: [char; 2] = ['#', '/'];

/// Characters a title must not contain: the separators plus the titles
/// listing's field separator `_`.
pub const TITLE_RESERVED_CHARS: [char; 3] = ['#', '/', '_'];

/// Maximum number of recipes the scale can store.
pub const MAX_DEVICE_RECIPES: usize = 9;

/// A single recipe step: an instruction, optionally with a target weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Instruction or ingredient text.
    pub body: String,
    /// Target weight (digits only), present for measured ingredients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

impl Step {
    /// Create an unweighted instruction step.
    pub fn instruction(body: impl Into<String>) -> Self {
        Step {
            body: body.into(),
            weight: None,
        }
    }

    /// Create a weighted ingredient step.
    pub fn weighted(body: impl Into<String>, weight: impl Into<String>) -> Self {
        Step {
            body: body.into(),
            weight: Some(weight.into()),
        }
    }

    /// Check the step against the device constraints.
    pub fn validate(&self) -> ProtocolResult<()> {
        check_text("step", &self.body, MAX_BODY_LEN, &RESERVED_CHARS)?;
        if let Some(ref weight) = self.weight {
            if weight.is_empty() || weight.chars().count() > MAX_WEIGHT_LEN {
                return Err(ProtocolError::InvalidRecipe(format!(
                    "weight must be 1..={} digits, got {:?}",
                    MAX_WEIGHT_LEN, weight
                )));
            }
            if !weight.chars().all(|c| c.is_ascii_digit()) {
                return Err(ProtocolError::InvalidRecipe(format!(
                    "weight must be digits only, got {:?}",
                    weight
                )));
            }
        }
        Ok(())
    }
}

/// A recipe: a title and an ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe title as shown on the scale.
    pub title: String,
    /// Steps in the order the scale walks through them.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Recipe {
    /// Create a new recipe.
    pub fn new(title: impl Into<String>, steps: Vec<Step>) -> Self {
        Recipe {
            title: title.into(),
            steps,
        }
    }

    /// Check the title and every step against the device constraints.
    pub fn validate(&self) -> ProtocolResult<()> {
        check_text("title", &self.title, MAX_TITLE_LEN, &TITLE_RESERVED_CHARS)?;
        for (i, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| match e {
                ProtocolError::InvalidRecipe(msg) => {
                    ProtocolError::InvalidRecipe(format!("step {}: {}", i + 1, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Title-only projection of this recipe.
    pub fn stub(&self) -> RecipeStub {
        RecipeStub::new(self.title.clone())
    }
}

/// A recipe known only by title, as listed by the scale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipeStub {
    /// Recipe title.
    pub title: String,
}

impl RecipeStub {
    /// Create a new stub.
    pub fn new(title: impl Into<String>) -> Self {
        RecipeStub {
            title: title.into(),
        }
    }
}

impl From<&Recipe> for RecipeStub {
    fn from(recipe: &Recipe) -> Self {
        recipe.stub()
    }
}

fn check_text(what: &str, text: &str, max_len: usize, reserved: &[char]) -> ProtocolResult<()> {
    if text.is_empty() {
        return Err(ProtocolError::InvalidRecipe(format!("{} must not be empty", what)));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(ProtocolError::InvalidRecipe(format!(
            "{} must be at most {} characters, got {}",
            what, max_len, len
        )));
    }
    if let Some(c) = text.chars().find(|c| reserved.contains(c)) {
        return Err(ProtocolError::InvalidRecipe(format!(
            "{} must not contain '{}'",
            what, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_recipe() {
        let recipe = Recipe::new(
            "Soup",
            vec![Step::weighted("Water", "500"), Step::instruction("Boil")],
        );
        assert!(recipe.validate().is_ok());
        assert_eq!(recipe.stub(), RecipeStub::new("Soup"));
    }

    #[test]
    fn test_title_constraints() {
        assert!(Recipe::new("", vec![]).validate().is_err());
        assert!(Recipe::new("a".repeat(MAX_TITLE_LEN), vec![]).validate().is_ok());
        assert!(Recipe::new("a".repeat(MAX_TITLE_LEN + 1), vec![]).validate().is_err());
        assert!(Recipe::new("Fish #2", vec![]).validate().is_err());
        assert!(Recipe::new("Half/Half", vec![]).validate().is_err());
        assert!(Recipe::new("Salt_Bread", vec![]).validate().is_err());
    }

    #[test]
    fn test_step_body_may_contain_underscore() {
        let recipe = Recipe::new("Bread", vec![Step::weighted("salt_and_pepper", "5")]);
        assert!(recipe.validate().is_ok());
    }

    #[test]
    fn test_step_constraints() {
        assert!(Step::instruction("").validate().is_err());
        assert!(Step::instruction("x".repeat(MAX_BODY_LEN + 1)).validate().is_err());
        assert!(Step::weighted("Flour", "1000").validate().is_err());
        assert!(Step::weighted("Flour", "12g").validate().is_err());
        assert!(Step::weighted("Flour", "").validate().is_err());
        assert!(Step::weighted("Flour", "250").validate().is_ok());
    }

    #[test]
    fn test_step_error_names_position() {
        let recipe = Recipe::new("Cake", vec![Step::instruction("Mix"), Step::instruction("")]);
        let err = recipe.validate().unwrap_err();
        assert!(err.to_string().contains("step 2"));
    }
}
