use async_trait::async_trait;

use crate::core::error::LauncherResult;
use crate::core::launch::{LaunchStep, StepContext};
use crate::core::log::level::LogLevel;

/// Emits one fixed message into the launch log.
pub struct TextPrint {
    message: String,
    level: LogLevel,
}

impl TextPrint {
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }
}

#[async_trait]
impl LaunchStep for TextPrint {
    fn name(&self) -> &str {
        "Print"
    }

    async fn perform(&mut self, ctx: &StepContext) -> LauncherResult<()> {
        ctx.emit_log(&self.message, self.level);
        Ok(())
    }
}
