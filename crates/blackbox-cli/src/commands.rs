use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Apps,
    Open(String),
    Click(usize),
    Set { id: String, value: String },
    Up,
    Down,
    Upload(PathBuf),
    Close,
    Show,
    Params,
    Param { field: String, value: String },
    Apply,
    ClearHistory,
    Save,
    Load,
    ClearSaved,
    Quit,
}

pub const HELP: &str = "\
Commands:
  apps                  list installed apps
  open APP_ID           open an app
  show                  print the current screen, its targets and inputs
  click N               click target N (see `show`)
  set ID VALUE          type VALUE into input ID
  up | down             walk the terminal command history
  upload PATH           upload a local file into the current folder
  close                 close the active app
  params                open or close the parameters panel
  param FIELD VALUE     edit a parameter (history, statefulness, quiet, color, font)
  apply                 apply the edited parameters
  clear-history         forget past interactions
  save | load           write or read the saved session
  clear-saved           delete the saved session
  quit";

/// Parses one REPL line. Blank lines are `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "help" | "?" => Command::Help,
        "apps" => Command::Apps,
        "open" => Command::Open(required(rest, "open APP_ID")?.to_string()),
        "click" => {
            let index = required(rest, "click N")?
                .parse::<usize>()
                .ok()
                .filter(|index| *index > 0)
                .ok_or_else(|| format!("not a target number: {rest}"))?;
            Command::Click(index)
        }
        "set" => {
            let (id, value) = pair(rest, "set ID VALUE")?;
            Command::Set { id, value }
        }
        "up" => Command::Up,
        "down" => Command::Down,
        "upload" => Command::Upload(PathBuf::from(required(rest, "upload PATH")?)),
        "close" => Command::Close,
        "show" | "ls" => Command::Show,
        "params" => Command::Params,
        "param" => {
            let (field, value) = pair(rest, "param FIELD VALUE")?;
            Command::Param { field, value }
        }
        "apply" => Command::Apply,
        "clear-history" => Command::ClearHistory,
        "save" => Command::Save,
        "load" => Command::Load,
        "clear-saved" => Command::ClearSaved,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(command))
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest)
    }
}

/// Splits `ID VALUE`; the value keeps its inner spaces and may be empty.
fn pair(rest: &str, usage: &str) -> Result<(String, String), String> {
    let rest = required(rest, usage)?;
    let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Ok((key.to_string(), value.trim_start().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn values_keep_their_spaces() {
        assert_eq!(
            parse("set terminal_input  ls -la /home").unwrap(),
            Some(Command::Set {
                id: "terminal_input".to_string(),
                value: "ls -la /home".to_string(),
            })
        );
        assert_eq!(
            parse("set notepad-textarea").unwrap(),
            Some(Command::Set {
                id: "notepad-textarea".to_string(),
                value: String::new(),
            })
        );
    }

    #[test]
    fn targets_are_one_based() {
        assert_eq!(parse(" click 2 ").unwrap(), Some(Command::Click(2)));
        assert!(parse("click 0").is_err());
        assert!(parse("click first").is_err());
        assert!(parse("click").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse("   ").unwrap(), None);
        let err = parse("reboot now").unwrap_err();
        assert!(err.contains("reboot"));
        assert_eq!(parse("open").unwrap_err(), "usage: open APP_ID");
    }

    #[test]
    fn parameters_take_a_field_and_value() {
        assert_eq!(
            parse("param color amber").unwrap(),
            Some(Command::Param {
                field: "color".to_string(),
                value: "amber".to_string(),
            })
        );
        assert_eq!(parse("apply").unwrap(), Some(Command::Apply));
    }
}
