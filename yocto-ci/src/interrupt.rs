use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use log::warn;

static GLOBAL: OnceLock<Interrupt> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    fn install() -> Result<Self, ctrlc::Error> {
        let interrupt = Self::new();
        let handle = interrupt.clone();
        ctrlc::set_handler(move || handle.trigger())?;
        Ok(interrupt)
    }

    /// ctrlc allows one handler per process; use this outside tests.
    pub fn global() -> Interrupt {
        GLOBAL
            .get_or_init(|| {
                Self::install().unwrap_or_else(|e| {
                    warn!("Ctrl-C will not stop the boot cleanly: {}", e);
                    Self::new()
                })
            })
            .clone()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
