use std::fmt;

use crate::event::{FiringOutcome, UnitStatus};

/// Totals for one engine run. Partial success is a normal outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub units_total: usize,
    pub units_attempted: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub units_skipped: usize,
    pub firings_attempted: usize,
    pub firings_succeeded: usize,
    pub firings_failed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record_unit(&mut self, status: UnitStatus) {
        match status {
            UnitStatus::Succeeded => {
                self.units_attempted += 1;
                self.units_succeeded += 1;
            }
            UnitStatus::FailedTerminal => {
                self.units_attempted += 1;
                self.units_failed += 1;
            }
            UnitStatus::Skipped => self.units_skipped += 1,
            UnitStatus::Cancelled => self.cancelled = true,
        }
    }

    pub fn record_firing(&mut self, outcome: FiringOutcome) {
        match outcome {
            FiringOutcome::Succeeded => {
                self.firings_attempted += 1;
                self.firings_succeeded += 1;
            }
            FiringOutcome::Failed => {
                self.firings_attempted += 1;
                self.firings_failed += 1;
            }
            FiringOutcome::Cancelled => self.cancelled = true,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.units_failed == 0 && self.firings_failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "units: {} attempted, {} succeeded, {} failed",
            self.units_attempted, self.units_succeeded, self.units_failed
        )?;
        if self.units_skipped > 0 {
            write!(f, " ({} already done)", self.units_skipped)?;
        }
        write!(
            f,
            "; firings: {} attempted, {} succeeded, {} failed",
            self.firings_attempted, self.firings_succeeded, self.firings_failed
        )?;
        if self.cancelled {
            f.write_str("; cancelled")?;
        }
        Ok(())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
