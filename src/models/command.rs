use crate::history::{ SessionFilter, DEFAULT_RECENT };
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    New {
        model_id: Option<String>,
    },
    Open {
        target: String,
    },
    List {
        filter: SessionFilter,
        search: Option<String>,
    },
    Rename {
        id: String,
        title: String,
    },
    Pin {
        id: String,
    },
    Delete {
        id: String,
    },
    Export {
        dir: Option<PathBuf>,
    },
    Restore {
        path: PathBuf,
    },
    Clear,
    Deep,
    Code,
    Search,
    Image {
        path: PathBuf,
    },
    Like {
        message_id: String,
    },
    Models,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

pub const HELP: &str =
    "\
/new [model]            start a new chat
/open <id|title>        switch to a saved chat
/list [all|pinned|recent N] [search...]
/rename <id> <title>    rename a chat
/pin <id>               pin or unpin a chat
/delete <id>            delete a chat
/export [dir]           write a backup file
/restore <file>         replace all chats with a backup
/clear                  delete every chat
/deep | /code           toggle deep or code thinking
/search                 toggle web search
/image <path>           attach an image to the next message
/like <message-id>      like or unlike a reply
/models                 list personas
/help | /quit";

fn required(arg: &str, usage: &str) -> Result<String, CommandError> {
    let arg = arg.trim();
    if arg.is_empty() {
        Err(CommandError(format!("usage: {}", usage)))
    } else {
        Ok(arg.to_string())
    }
}

fn optional(arg: &str) -> Option<String> {
    let arg = arg.trim();
    (!arg.is_empty()).then(|| arg.to_string())
}

fn parse_list(rest: &str) -> Result<Command, CommandError> {
    let mut words = rest.split_whitespace().peekable();
    let filter = match words.peek().copied() {
        Some("all") => {
            words.next();
            SessionFilter::All
        }
        Some("pinned") => {
            words.next();
            SessionFilter::Pinned
        }
        Some("recent") => {
            words.next();
            let n = match words.peek().and_then(|w| w.parse::<usize>().ok()) {
                Some(n) => {
                    words.next();
                    n
                }
                None => DEFAULT_RECENT,
            };
            SessionFilter::Recent(n)
        }
        _ => SessionFilter::All,
    };
    let search = words.collect::<Vec<_>>().join(" ");
    Ok(Command::List {
        filter,
        search: optional(&search),
    })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(body) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };
        let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));

        match name.to_lowercase().as_str() {
            "new" => Ok(Command::New { model_id: optional(rest) }),
            "open" => Ok(Command::Open { target: required(rest, "/open <id|title>")? }),
            "list" | "ls" => parse_list(rest),
            "rename" => {
                let usage = "/rename <id> <title>";
                let (id, title) = rest.trim().split_once(char::is_whitespace).ok_or_else(||
                    CommandError(format!("usage: {}", usage))
                )?;
                Ok(Command::Rename { id: id.to_string(), title: required(title, usage)? })
            }
            "pin" => Ok(Command::Pin { id: required(rest, "/pin <id>")? }),
            "delete" | "rm" => Ok(Command::Delete { id: required(rest, "/delete <id>")? }),
            "export" => Ok(Command::Export { dir: optional(rest).map(PathBuf::from) }),
            "restore" => Ok(Command::Restore { path: required(rest, "/restore <file>")?.into() }),
            "clear" => Ok(Command::Clear),
            "deep" => Ok(Command::Deep),
            "code" => Ok(Command::Code),
            "search" => Ok(Command::Search),
            "image" => Ok(Command::Image { path: required(rest, "/image <path>")?.into() }),
            "like" => Ok(Command::Like { message_id: required(rest, "/like <message-id>")? }),
            "models" => Ok(Command::Models),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError(format!("unknown command /{}, try /help", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent_trimmed() {
        assert_eq!("  hello there ".parse::<Command>().unwrap(), Command::Send("hello there".into()));
    }

    #[test]
    fn list_takes_filter_count_and_search() {
        assert_eq!("/list".parse::<Command>().unwrap(), Command::List {
            filter: SessionFilter::All,
            search: None,
        });
        assert_eq!("/list recent 3 rust async".parse::<Command>().unwrap(), Command::List {
            filter: SessionFilter::Recent(3),
            search: Some("rust async".into()),
        });
        assert_eq!("/list recent".parse::<Command>().unwrap(), Command::List {
            filter: SessionFilter::Recent(DEFAULT_RECENT),
            search: None,
        });
        assert_eq!("/list pasta".parse::<Command>().unwrap(), Command::List {
            filter: SessionFilter::All,
            search: Some("pasta".into()),
        });
    }

    #[test]
    fn rename_keeps_spaces_in_title() {
        assert_eq!("/rename 17 My  Chat".parse::<Command>().unwrap(), Command::Rename {
            id: "17".into(),
            title: "My  Chat".into(),
        });
        assert!("/rename 17".parse::<Command>().is_err());
    }

    #[test]
    fn missing_arguments_and_unknown_commands_fail() {
        assert!("/open".parse::<Command>().is_err());
        assert!("/image   ".parse::<Command>().is_err());
        let err = "/frobnicate".parse::<Command>().unwrap_err();
        assert!(err.to_string().contains("/frobnicate"));
    }

    #[test]
    fn optional_arguments() {
        assert_eq!("/new".parse::<Command>().unwrap(), Command::New { model_id: None });
        assert_eq!("/NEW model-claude".parse::<Command>().unwrap(), Command::New {
            model_id: Some("model-claude".into()),
        });
        assert_eq!("/export".parse::<Command>().unwrap(), Command::Export { dir: None });
    }
}
