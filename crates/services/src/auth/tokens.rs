use super::ports::TokenGenerator;
use uuid::Uuid;

/// Random v4 UUIDs in canonical hyphenated form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenGenerator;

impl TokenGenerator for UuidTokenGenerator {
    fn generate(&self) -> anyhow::Result<String> {
        Ok(Uuid::new_v4().to_string())
    }
}
