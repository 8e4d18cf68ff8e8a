use std::time::Duration;

use colored::*;
use sweepr_common::model::Project;
use sweepr_core::RunSummary;
use tracing::info;

use crate::terminal::colors;

pub const TOTAL_WIDTH: usize = 64;
pub const TARGET: &str = "sweepr::print";
pub const FIELD: &str = "raw_msg";

const KEY_WIDTH: usize = 10;

pub fn print(msg: &str) {
    info!(target: "sweepr::print", raw_msg = msg);
}

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = console::measure_text_width(&formatted);

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right)
    )
    .bright_black();

    print(&format!("{}", line));
}

pub fn fat_separator() {
    let sep: ColoredString = "═".repeat(TOTAL_WIDTH).color(colors::SEPARATOR);
    print(&format!("{}", sep));
}

pub fn aligned_line(key: &str, value: &str) {
    let dots: String = ".".repeat((KEY_WIDTH + 1).saturating_sub(key.len()));
    let colon: String = format!(
        "{}{}",
        dots.color(colors::SEPARATOR),
        ":".color(colors::SEPARATOR)
    );
    print_status(format!(
        "{}{} {}",
        key.color(colors::PRIMARY),
        colon,
        value.color(colors::TEXT_DEFAULT)
    ));
}

pub fn print_status<T: AsRef<str>>(msg: T) {
    let prefix: ColoredString = ">".color(colors::SEPARATOR);
    print(&format!("{} {}", prefix, msg.as_ref()));
}

pub fn tree_head(idx: usize, name: &str) {
    let idx_str: String = format!("[{}]", idx.to_string().color(colors::ACCENT));
    print(&format!(
        "{} {}",
        idx_str.color(colors::SEPARATOR),
        name.color(colors::PRIMARY)
    ));
}

pub fn centerln(msg: &str) {
    let space = " ".repeat(TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2);
    print(&format!("{}{}", space, msg));
}

fn count(n: usize, color: Color) -> ColoredString {
    if n == 0 {
        n.to_string().color(colors::SEPARATOR)
    } else {
        n.to_string().color(color).bold()
    }
}

pub fn run_summary(summary: &RunSummary, project: &Project, elapsed: Duration) {
    header("run summary");
    if summary.units_total > 0 {
        aligned_line(
            "Units",
            &format!(
                "{} ok, {} failed, {} already done",
                count(summary.units_succeeded, colors::GOOD),
                count(summary.units_failed, colors::BAD),
                count(summary.units_skipped, colors::ACCENT),
            ),
        );
    }
    aligned_line(
        "Tools",
        &format!(
            "{} ok, {} failed",
            count(summary.firings_succeeded, colors::GOOD),
            count(summary.firings_failed, colors::BAD),
        ),
    );
    aligned_line(
        "Project",
        &format!(
            "{} hosts, {} services",
            project.hosts.len(),
            project.service_count()
        ),
    );

    fat_separator();
    let time: ColoredString = format!("{:.2}s", elapsed.as_secs_f64()).bold().yellow();
    let status: ColoredString = if summary.cancelled {
        "Run cancelled".yellow().bold()
    } else if summary.is_clean() {
        "Run complete".green().bold()
    } else {
        "Run finished with failures".red().bold()
    };
    centerln(&format!("{status} in {time}"));
}
