use sweepr_common::model::{Service, ServiceKey};
use sweepr_common::naming::is_shell_safe;
use sweepr_common::rules::{CommandTemplate, TemplateValues};
use sweepr_common::{Error, Result};

use crate::artifact::ArtifactPaths;

/// Expands `template` for one service. Every substituted value must be
/// shell-safe, since the result is handed to `sh -c`.
pub fn render(
    template: &CommandTemplate,
    key: &ServiceKey,
    service: &Service,
    paths: &ArtifactPaths,
) -> Result<String> {
    let ip = key.ip.to_string();
    let port = key.port.to_string();
    let url = service.url(&key.ip);
    let output_path = paths.output.to_string_lossy();
    let screenshot_path = paths.screenshot.to_string_lossy();

    let values = TemplateValues {
        ip: &ip,
        port: &port,
        protocol: key.protocol.as_str(),
        output_path: &output_path,
        url: &url,
        screenshot_path: &screenshot_path,
    };

    for (name, value) in [
        ("ip", values.ip),
        ("output_path", values.output_path),
        ("url", values.url),
        ("screenshot_path", values.screenshot_path),
    ] {
        if !is_shell_safe(value) {
            return Err(Error::config(format!(
                "refusing to substitute unsafe {name} '{value}' into '{template}'"
            )));
        }
    }

    Ok(template.expand(&values))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
