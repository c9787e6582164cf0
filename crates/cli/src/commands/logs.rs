//! `aires logs`: tails the daemon's rotated log file.

use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;

pub async fn cmd_logs(config_path: PathBuf, follow: bool, lines: usize, date: Option<String>) -> Result<()> {
  let config = aires_core::Config::load(&config_path).with_context(|| format!("failed to load config from {}", config_path.display()))?;
  let Some(directory) = config.log.directory else {
    bail!("daemon is configured for console logging (log.directory is unset); nothing to tail");
  };

  let day = date.unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());
  let log_file = directory.join(format!("aires.log.{day}"));
  if !log_file.exists() {
    bail!("no log file for {day} at {}", log_file.display());
  }

  print_tail(&log_file, lines)?;

  if follow {
    follow_file(&log_file).await?;
  }
  Ok(())
}

fn print_tail(path: &std::path::Path, lines: usize) -> Result<()> {
  let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let total = content.lines().count();
  let skip = total.saturating_sub(lines);
  for line in content.lines().skip(skip) {
    println!("{line}");
  }
  Ok(())
}

async fn follow_file(path: &std::path::Path) -> Result<()> {
  let mut file = std::fs::File::open(path)?;
  let mut position = file.seek(SeekFrom::End(0))?;

  loop {
    tokio::time::sleep(Duration::from_millis(500)).await;
    let metadata = std::fs::metadata(path)?;
    if metadata.len() < position {
      position = 0;
    }
    if metadata.len() > position {
      file.seek(SeekFrom::Start(position))?;
      let mut chunk = String::new();
      std::io::Read::read_to_string(&mut file, &mut chunk)?;
      print!("{chunk}");
      position = metadata.len();
    }
  }
}
