use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// One line typed by the user, split into wall name and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLine<'a> {
    pub wall: &'a str,
    pub text: &'a str,
}

/// Parse `"<Wall>: <text>"`. Returns `None` when there is no wall prefix.
pub fn parse_line(line: &str) -> Option<UserLine<'_>> {
    let (wall, text) = line.split_once(':')?;
    let wall = wall.trim();
    if wall.is_empty() || wall.contains(char::is_whitespace) {
        return None;
    }
    Some(UserLine {
        wall,
        text: text.trim(),
    })
}

/// Forward stdin lines into a channel until EOF or the receiver goes away.
pub fn spawn_stdin_reader(buffer: usize) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_colon() {
        assert_eq!(
            parse_line("Pi: hello: world"),
            Some(UserLine {
                wall: "Pi",
                text: "hello: world"
            })
        );
    }

    #[test]
    fn blank_text_is_kept_for_the_scheduler_to_ignore() {
        assert_eq!(
            parse_line("  Moti :   "),
            Some(UserLine {
                wall: "Moti",
                text: ""
            })
        );
    }

    #[test]
    fn rejects_lines_without_a_wall() {
        assert_eq!(parse_line("hello"), None);
        assert_eq!(parse_line(": hello"), None);
        assert_eq!(parse_line("two words: hello"), None);
    }
}
