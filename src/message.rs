/// The closed set of message tags the gateway interprets.
///
/// Anything outside this set still round-trips through the wire protocol
/// (decoded into `Unknown`, re-encoded with the original byte) so a future
/// backend can add message types without the gateway needing to understand
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    InputStart,
    InputPoll,
    InputEval,
    OutputReady,
    OutputOther,
    OutputEvalResult,
    OutputEvalError,
    OutputParseError,
    OutputParseIncomplete,
    OutputFatalError,
    Unknown(u8),
}

impl MessageKind {
    pub const INPUT_START: u8 = 1;
    pub const INPUT_POLL: u8 = 2;
    pub const INPUT_EVAL: u8 = 3;
    pub const OUTPUT_READY: u8 = 10;
    pub const OUTPUT_OTHER: u8 = 11;
    pub const OUTPUT_EVAL_RESULT: u8 = 12;
    pub const OUTPUT_EVAL_ERROR: u8 = 13;
    pub const OUTPUT_PARSE_ERROR: u8 = 14;
    pub const OUTPUT_PARSE_INCOMPLETE: u8 = 15;
    pub const OUTPUT_FATAL_ERROR: u8 = 16;

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            Self::INPUT_START => Self::InputStart,
            Self::INPUT_POLL => Self::InputPoll,
            Self::INPUT_EVAL => Self::InputEval,
            Self::OUTPUT_READY => Self::OutputReady,
            Self::OUTPUT_OTHER => Self::OutputOther,
            Self::OUTPUT_EVAL_RESULT => Self::OutputEvalResult,
            Self::OUTPUT_EVAL_ERROR => Self::OutputEvalError,
            Self::OUTPUT_PARSE_ERROR => Self::OutputParseError,
            Self::OUTPUT_PARSE_INCOMPLETE => Self::OutputParseIncomplete,
            Self::OUTPUT_FATAL_ERROR => Self::OutputFatalError,
            other => Self::Unknown(other),
        }
    }

    pub fn to_tag(self) -> u8 {
        match self {
            Self::InputStart => Self::INPUT_START,
            Self::InputPoll => Self::INPUT_POLL,
            Self::InputEval => Self::INPUT_EVAL,
            Self::OutputReady => Self::OUTPUT_READY,
            Self::OutputOther => Self::OUTPUT_OTHER,
            Self::OutputEvalResult => Self::OUTPUT_EVAL_RESULT,
            Self::OutputEvalError => Self::OUTPUT_EVAL_ERROR,
            Self::OutputParseError => Self::OUTPUT_PARSE_ERROR,
            Self::OutputParseIncomplete => Self::OUTPUT_PARSE_INCOMPLETE,
            Self::OutputFatalError => Self::OUTPUT_FATAL_ERROR,
            Self::Unknown(tag) => tag,
        }
    }

    /// Outbound messages that terminate a synchronous eval-wait poll.
    pub fn is_eval_terminal(self) -> bool {
        matches!(
            self,
            Self::OutputParseError
                | Self::OutputParseIncomplete
                | Self::OutputEvalResult
                | Self::OutputEvalError
        )
    }
}

/// One unit of the framed wire protocol: a tag plus its ordered byte-string
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub args: Vec<Vec<u8>>,
}

impl Message {
    pub fn new(kind: MessageKind, args: Vec<Vec<u8>>) -> Self {
        Self { kind, args }
    }

    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(|a| std::str::from_utf8(a).ok())
    }
}
