//! Process termination strategies

use super::ProcessController;
use log::{info, warn};
use std::sync::Arc;

/// Exits the process. Used where the OS lets an app close itself.
pub struct ExitProcess {
    code: i32,
}

impl ExitProcess {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

impl ProcessController for ExitProcess {
    fn supports_termination(&self) -> bool {
        true
    }

    fn terminate(&self) {
        warn!("Terminating process (exit code {})", self.code);
        std::process::exit(self.code);
    }
}

/// Leaves the process running in its signed-out state. Used where apps may
/// not terminate themselves.
pub struct RetainProcess;

impl ProcessController for RetainProcess {
    fn supports_termination(&self) -> bool {
        false
    }

    fn terminate(&self) {
        info!("Process termination unsupported on this platform - staying signed out");
    }
}

/// Controller for the platform this binary was built for.
pub fn for_current_platform() -> Arc<dyn ProcessController> {
    if cfg!(target_os = "ios") {
        Arc::new(RetainProcess)
    } else {
        Arc::new(ExitProcess::new(0))
    }
}
