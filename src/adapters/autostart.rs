use crate::domain::ports::AutostartRegistrar;
use crate::utils::error::Result;

/// Autostart registration is platform specific; this registrar only reports
/// the command that would have been registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAutostart;

impl AutostartRegistrar for NoopAutostart {
    fn register(&self, command: &[String]) -> Result<()> {
        tracing::warn!(
            "⚠️ Autostart is not supported on this platform, run '{}' manually at login",
            command.join(" ")
        );
        Ok(())
    }
}
