use crate::display::{format_time, progress_bar};
use crate::messages::{Intent, Session, Snapshot};
use anyhow::{Result, bail};

pub const HELP: &str = "\
commands:
  record            start a new recording
  done              stop recording and preview the take
  cancel            stop recording and throw the take away
  toggle            play or pause the preview / open recording
  save | discard    keep or drop the previewed take
  open <id>         play a saved recording
  seek <seconds>    jump within the open recording
  close             stop the open recording
  delete <id>       delete a saved recording
  refresh           rescan the library
  list | state      print the library / current session
  quit";

/// A parsed line of shell input
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Intent(Intent),
    List,
    State,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ShellCommand> {
    let line = line.trim();
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, arg.trim()),
        None => (line, ""),
    };

    let command = match (word.to_ascii_lowercase().as_str(), arg) {
        ("record", "") => ShellCommand::Intent(Intent::BeginRecording),
        ("done", "") => ShellCommand::Intent(Intent::FinishRecording),
        ("cancel", "") => ShellCommand::Intent(Intent::CancelRecording),
        ("toggle" | "play" | "pause", "") => ShellCommand::Intent(Intent::TogglePlayback),
        ("save", "") => ShellCommand::Intent(Intent::Save),
        ("discard", "") => ShellCommand::Intent(Intent::Discard),
        ("close", "") => ShellCommand::Intent(Intent::Close),
        ("refresh", "") => ShellCommand::Intent(Intent::Refresh),
        ("open", id) if !id.is_empty() => ShellCommand::Intent(Intent::OpenLibraryItem(id.into())),
        ("delete", id) if !id.is_empty() => {
            ShellCommand::Intent(Intent::DeleteRecording(id.into()))
        }
        ("seek", secs) if !secs.is_empty() => {
            let position: f64 = secs
                .parse()
                .map_err(|_| anyhow::anyhow!("seek needs a number of seconds, got {:?}", secs))?;
            ShellCommand::Intent(Intent::Seek(position))
        }
        ("list" | "ls", "") => ShellCommand::List,
        ("state", "") => ShellCommand::State,
        ("help" | "?", "") => ShellCommand::Help,
        ("quit" | "exit", "") => ShellCommand::Quit,
        ("", _) => bail!("empty command"),
        _ => bail!("unknown command {:?}, type help", line),
    };

    Ok(command)
}

/// One status line for the current session
pub fn render_session(session: &Session) -> String {
    match session {
        Session::Idle => "idle".to_string(),
        Session::Recording {
            elapsed_seconds, ..
        } => format!("recording {}", format_time(*elapsed_seconds as f64)),
        Session::Previewing {
            position_seconds,
            duration_seconds,
            is_playing,
            ..
        } => format!(
            "preview {} {} {} / {}",
            if *is_playing { "playing" } else { "paused" },
            progress_bar(session.progress_percent().unwrap_or_default(), 20),
            format_time(*position_seconds),
            format_time(*duration_seconds),
        ),
        Session::Playing {
            recording,
            position_seconds,
            duration_seconds,
            is_playing,
        } => format!(
            "{} {} {} {} / {}",
            recording.id,
            if *is_playing { "playing" } else { "paused" },
            progress_bar(session.progress_percent().unwrap_or_default(), 20),
            format_time(*position_seconds),
            format_time(*duration_seconds),
        ),
    }
}

pub fn render_library(snapshot: &Snapshot) -> String {
    if snapshot.library.is_empty() {
        return "No audio files yet".to_string();
    }
    snapshot
        .library
        .iter()
        .map(|recording| format!("  {}", recording.id))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Recording;
    use std::path::PathBuf;

    #[test]
    fn test_parse_intents() {
        assert_eq!(
            parse_command("record").unwrap(),
            ShellCommand::Intent(Intent::BeginRecording)
        );
        assert_eq!(
            parse_command("  open audio_1.wav ").unwrap(),
            ShellCommand::Intent(Intent::OpenLibraryItem("audio_1.wav".into()))
        );
        assert_eq!(
            parse_command("seek 12.5").unwrap(),
            ShellCommand::Intent(Intent::Seek(12.5))
        );
        assert_eq!(parse_command("LIST").unwrap(), ShellCommand::List);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("open").is_err());
        assert!(parse_command("seek soon").is_err());
        assert!(parse_command("save now").is_err());
        assert!(parse_command("fly").is_err());
    }

    #[test]
    fn test_render_session() {
        assert_eq!(
            render_session(&Session::Recording {
                started_at: chrono::Utc::now(),
                elapsed_seconds: 75,
            }),
            "recording 01:15"
        );

        let playing = Session::Playing {
            recording: Recording {
                id: "a.wav".into(),
                uri: PathBuf::from("/tmp/a.wav"),
            },
            position_seconds: 5.0,
            duration_seconds: 10.0,
            is_playing: false,
        };
        assert_eq!(
            render_session(&playing),
            "a.wav paused [##########----------] 00:05 / 00:10"
        );
    }

    #[test]
    fn test_render_empty_library() {
        assert_eq!(render_library(&Snapshot::default()), "No audio files yet");
    }
}
