use super::command_registry::{
    find_action, Action, NO_ARG_COMMANDS, PATH_ARG_COMMANDS, TEXT_ARG_COMMANDS,
};

/// One line of chat input mapped onto a session event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Noop,
    Help,
    Quit,
    ListSubjects,
    SelectSubject(String),
    ChangeSubject,
    StartCapture,
    CaptureFrame,
    CancelCapture,
    ImportImage(String),
    ClearImage,
    SetPrompt(String),
    Submit,
    AskFollowUp(String),
    NewQuestion,
    Acknowledge,
    SelectTab(String),
    ShowTabs,
    /// Free text: a new question in `Ready`, a follow-up in `Result`.
    Text(String),
    Unknown { command: String, arg: String },
}

fn parse_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<String>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

fn no_arg_command(action: Action) -> ChatCommand {
    match action {
        Action::Help => ChatCommand::Help,
        Action::Quit => ChatCommand::Quit,
        Action::ListSubjects => ChatCommand::ListSubjects,
        Action::ChangeSubject => ChatCommand::ChangeSubject,
        Action::StartCapture => ChatCommand::StartCapture,
        Action::CaptureFrame => ChatCommand::CaptureFrame,
        Action::CancelCapture => ChatCommand::CancelCapture,
        Action::ClearImage => ChatCommand::ClearImage,
        Action::Submit => ChatCommand::Submit,
        Action::NewQuestion => ChatCommand::NewQuestion,
        Action::Acknowledge => ChatCommand::Acknowledge,
        Action::ShowTabs => ChatCommand::ShowTabs,
        Action::SelectSubject
        | Action::SetPrompt
        | Action::AskFollowUp
        | Action::SelectTab
        | Action::ImportImage => ChatCommand::Noop,
    }
}

fn arg_command(action: Action, arg: String) -> ChatCommand {
    match action {
        Action::SelectSubject => ChatCommand::SelectSubject(arg),
        Action::SetPrompt => ChatCommand::SetPrompt(arg),
        Action::AskFollowUp => ChatCommand::AskFollowUp(arg),
        Action::SelectTab => ChatCommand::SelectTab(arg),
        Action::ImportImage => ChatCommand::ImportImage(arg),
        other => no_arg_command(other),
    }
}

pub fn parse_command(text: &str) -> ChatCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatCommand::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return no_arg_command(action);
            }
            if let Some(action) = find_action(&command, TEXT_ARG_COMMANDS) {
                return arg_command(action, arg.to_string());
            }
            if let Some(action) = find_action(&command, PATH_ARG_COMMANDS) {
                return arg_command(action, parse_path_arg(arg));
            }
            return ChatCommand::Unknown {
                command,
                arg: arg.to_string(),
            };
        }
    }

    ChatCommand::Text(raw_trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_command, ChatCommand};

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_command("   \n"), ChatCommand::Noop);
    }

    #[test]
    fn plain_text_is_passed_through_trimmed() {
        assert_eq!(
            parse_command("  2+2=?  "),
            ChatCommand::Text("2+2=?".to_string())
        );
    }

    #[test]
    fn parse_lifecycle_commands() {
        assert_eq!(parse_command("/camera"), ChatCommand::StartCapture);
        assert_eq!(parse_command("/SNAP"), ChatCommand::CaptureFrame);
        assert_eq!(parse_command("/cancel"), ChatCommand::CancelCapture);
        assert_eq!(parse_command("/submit"), ChatCommand::Submit);
        assert_eq!(parse_command("/new"), ChatCommand::NewQuestion);
        assert_eq!(parse_command("/ack"), ChatCommand::Acknowledge);
        assert_eq!(parse_command("/back"), ChatCommand::ChangeSubject);
        assert_eq!(parse_command("/exit"), ChatCommand::Quit);
    }

    #[test]
    fn parse_text_arg_commands() {
        assert_eq!(
            parse_command("/subject  math "),
            ChatCommand::SelectSubject("math".to_string())
        );
        assert_eq!(
            parse_command("/ask why does it work?"),
            ChatCommand::AskFollowUp("why does it work?".to_string())
        );
        assert_eq!(
            parse_command("/tab deep"),
            ChatCommand::SelectTab("deep".to_string())
        );
        assert_eq!(parse_command("/prompt"), ChatCommand::SetPrompt(String::new()));
    }

    #[test]
    fn parse_image_path_with_quotes() {
        assert_eq!(
            parse_command("/image \"/tmp/my exercise.png\""),
            ChatCommand::ImportImage("/tmp/my exercise.png".to_string())
        );
        assert_eq!(
            parse_command("/image a.png"),
            ChatCommand::ImportImage("a.png".to_string())
        );
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            parse_command("/magic foo bar"),
            ChatCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
    }

    #[test]
    fn lone_slash_is_text() {
        assert_eq!(parse_command("/"), ChatCommand::Text("/".to_string()));
    }
}
