//! nmap as a black box: argv construction in [`command`], report parsing
//! in [`xml`].

pub mod command;
pub mod xml;

pub use command::{NmapCommand, NmapInvocation, NmapTargets};
pub use xml::{ObservedHost, ObservedPort, ScanReport};

/// Output marker nmap prints when the capture interface vanished mid-scan.
/// Results from such a run are incomplete even if the exit code is zero.
pub fn is_interface_failure(line: &str) -> bool {
    line.contains("pcap_next_ex") && line.contains("interface disappeared")
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
