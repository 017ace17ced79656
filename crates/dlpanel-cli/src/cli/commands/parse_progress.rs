//! `dlpanel parse-progress` – show how downloader output lines are read.

use anyhow::Result;
use dlpanel_core::progress::{self, LineKind};
use std::io::BufRead;

fn describe(line: &str) -> String {
    match progress::classify(line) {
        LineKind::Progress(s) => format!(
            "progress  {}% {}/{} rate={}/s eta={}{}",
            s.percent,
            s.bytes_done,
            s.bytes_total,
            s.rate,
            s.eta,
            if s.percent_in_range() { "" } else { " (out of range, skipped)" }
        ),
        LineKind::AlreadySatisfied => "already-present".to_string(),
        LineKind::ServerReady => "server-ready".to_string(),
        LineKind::Text => "text".to_string(),
    }
}

pub fn run_parse_progress(lines: &[String]) -> Result<()> {
    if !lines.is_empty() {
        for line in lines {
            println!("{}", describe(line));
        }
        return Ok(());
    }
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        // Carriage-return redraws count as separate lines.
        for part in line.split('\r').map(str::trim).filter(|p| !p.is_empty()) {
            println!("{}", describe(part));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::describe;

    #[test]
    fn describes_each_shape() {
        assert_eq!(
            describe("[#2089b0 16GiB/31GiB(52%) CN:16 DL:80MiB ETA:3m12s]"),
            "progress  52% 16GiB/31GiB rate=80MiB/s eta=3m12s"
        );
        assert_eq!(describe("File already exists"), "already-present");
        assert_eq!(describe("Download Results:"), "text");
    }
}
