//! `forge logs`: tails a loop's append-only log file.

use crate::context::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use forge_core::error::{ForgeError, Result};
use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

pub async fn run(ctx: &Context, loop_ref: String, follow: bool, lines: Option<usize>, since: Option<String>, all: bool) -> Result<()> {
    let lp = ctx.store.get_loop(&loop_ref).await?;
    let path = std::path::Path::new(&lp.log_path);
    if !path.exists() {
        return Err(ForgeError::NotFound(format!("log file for loop '{}'", lp.name)));
    }

    let since_cutoff = since.map(|d| parse_since(&d)).transpose()?;
    let mut file = std::fs::File::open(path).map_err(ForgeError::Io)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(ForgeError::Io)?;

    let mut selected: Vec<&str> = contents.lines().filter(|line| matches_since(line, since_cutoff)).collect();
    if !all {
        if let Some(n) = lines.or(Some(100)) {
            let start = selected.len().saturating_sub(n);
            selected = selected.split_off(start);
        }
    }
    for line in &selected {
        println!("{line}");
    }

    if follow {
        let mut pos = file.metadata().map_err(ForgeError::Io)?.len();
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let metadata = std::fs::metadata(path).map_err(ForgeError::Io)?;
            if metadata.len() < pos {
                pos = 0; // log was rotated/truncated underneath us
            }
            if metadata.len() > pos {
                file.seek(SeekFrom::Start(pos)).map_err(ForgeError::Io)?;
                let mut chunk = String::new();
                file.read_to_string(&mut chunk).map_err(ForgeError::Io)?;
                print!("{chunk}");
                pos = metadata.len();
            }
        }
    }

    Ok(())
}

fn matches_since(line: &str, cutoff: Option<DateTime<Utc>>) -> bool {
    let Some(cutoff) = cutoff else { return true };
    let Some(stamp) = line.strip_prefix('[').and_then(|rest| rest.split_once(']')).map(|(ts, _)| ts) else {
        return true;
    };
    DateTime::parse_from_rfc3339(stamp).map(|t| t.with_timezone(&Utc) >= cutoff).unwrap_or(true)
}

/// Parses a duration like `30m`, `2h`, `1d` into a cutoff timestamp.
fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    let (number, unit) = raw.split_at(raw.len() - 1);
    let amount: i64 = number
        .parse()
        .map_err(|_| ForgeError::InvalidArgument(format!("invalid --since duration '{raw}'")))?;
    let duration = match unit {
        "s" => ChronoDuration::seconds(amount),
        "m" => ChronoDuration::minutes(amount),
        "h" => ChronoDuration::hours(amount),
        "d" => ChronoDuration::days(amount),
        other => return Err(ForgeError::InvalidArgument(format!("unknown --since unit '{other}', expected s|m|h|d"))),
    };
    Ok(Utc::now() - duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_since_accepts_minutes() {
        let cutoff = parse_since("30m").unwrap();
        assert!(cutoff < Utc::now());
    }

    #[test]
    fn parse_since_rejects_unknown_unit() {
        assert!(parse_since("5x").is_err());
    }

    #[test]
    fn matches_since_with_no_cutoff_accepts_everything() {
        assert!(matches_since("no timestamp here", None));
    }
}
