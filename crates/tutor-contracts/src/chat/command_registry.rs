#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    Help,
    Quit,
    ListSubjects,
    SelectSubject,
    ChangeSubject,
    StartCapture,
    CaptureFrame,
    CancelCapture,
    ImportImage,
    ClearImage,
    SetPrompt,
    Submit,
    AskFollowUp,
    NewQuestion,
    Acknowledge,
    SelectTab,
    ShowTabs,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: Action,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: Action::Help,
    },
    CommandSpec {
        command: "quit",
        action: Action::Quit,
    },
    CommandSpec {
        command: "exit",
        action: Action::Quit,
    },
    CommandSpec {
        command: "subjects",
        action: Action::ListSubjects,
    },
    CommandSpec {
        command: "back",
        action: Action::ChangeSubject,
    },
    CommandSpec {
        command: "camera",
        action: Action::StartCapture,
    },
    CommandSpec {
        command: "snap",
        action: Action::CaptureFrame,
    },
    CommandSpec {
        command: "cancel",
        action: Action::CancelCapture,
    },
    CommandSpec {
        command: "clear_image",
        action: Action::ClearImage,
    },
    CommandSpec {
        command: "submit",
        action: Action::Submit,
    },
    CommandSpec {
        command: "new",
        action: Action::NewQuestion,
    },
    CommandSpec {
        command: "ack",
        action: Action::Acknowledge,
    },
    CommandSpec {
        command: "tabs",
        action: Action::ShowTabs,
    },
];

pub(crate) const TEXT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "subject",
        action: Action::SelectSubject,
    },
    CommandSpec {
        command: "prompt",
        action: Action::SetPrompt,
    },
    CommandSpec {
        command: "ask",
        action: Action::AskFollowUp,
    },
    CommandSpec {
        command: "tab",
        action: Action::SelectTab,
    },
];

pub(crate) const PATH_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "image",
    action: Action::ImportImage,
}];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/subjects",
    "/subject",
    "/back",
    "/camera",
    "/snap",
    "/cancel",
    "/image",
    "/clear_image",
    "/prompt",
    "/submit",
    "/ask",
    "/new",
    "/ack",
    "/tabs",
    "/tab",
    "/help",
    "/quit",
];

pub(crate) fn find_action(command: &str, specs: &[CommandSpec]) -> Option<Action> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}
