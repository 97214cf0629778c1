//! The action codec: graph mutations encoded as length-delimited binary
//! frames for the follower channel. The verb alphabet is closed; adding a
//! verb means touching every match in this file, which is the point.

use std::fmt;

const ADD_APP: u8 = 1;
const REMOVE_APP: u8 = 2;
const RECONFIG_APP: u8 = 3;
const LINK: u8 = 4;
const UNLINK: u8 = 5;

/// One atomic mutation a follower applies to its app graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Instantiate an app.
    AddApp {
        /// App name, unique in the graph.
        name: String,
        /// App class.
        kind: String,
        /// Printed argument string.
        config: String,
    },
    /// Stop and drop an app.
    RemoveApp {
        /// App name.
        name: String,
    },
    /// Reconfigure a running app in place.
    ReconfigApp {
        /// App name.
        name: String,
        /// Printed argument string.
        config: String,
    },
    /// Connect a link.
    Link {
        /// Link spec, `from.port -> to.port`.
        spec: String,
    },
    /// Disconnect a link.
    Unlink {
        /// Link spec, `from.port -> to.port`.
        spec: String,
    },
}

/// Decoding failures. Encoding is total over [`Action`] and cannot fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CodecError {
    /// The verb byte is not in the alphabet.
    UnknownVerb(u8),
    /// The frame ends before its operands do.
    Truncated,
    /// An operand is malformed, or the frame has trailing bytes.
    BadOperand,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVerb(verb) => write!(f, "unknown action verb {verb}"),
            Self::Truncated => write!(f, "truncated action frame"),
            Self::BadOperand => write!(f, "malformed action operand"),
        }
    }
}

impl std::error::Error for CodecError {}

fn push_operand(frame: &mut Vec<u8>, operand: &str) {
    frame.extend((operand.len() as u32).to_le_bytes());
    frame.extend(operand.as_bytes());
}

/// Encodes an action to its wire frame.
pub fn encode(action: &Action) -> Vec<u8> {
    let mut frame = Vec::new();
    match action {
        Action::AddApp { name, kind, config } => {
            frame.push(ADD_APP);
            push_operand(&mut frame, name);
            push_operand(&mut frame, kind);
            push_operand(&mut frame, config);
        }
        Action::RemoveApp { name } => {
            frame.push(REMOVE_APP);
            push_operand(&mut frame, name);
        }
        Action::ReconfigApp { name, config } => {
            frame.push(RECONFIG_APP);
            push_operand(&mut frame, name);
            push_operand(&mut frame, config);
        }
        Action::Link { spec } => {
            frame.push(LINK);
            push_operand(&mut frame, spec);
        }
        Action::Unlink { spec } => {
            frame.push(UNLINK);
            push_operand(&mut frame, spec);
        }
    }
    frame
}

struct Operands<'a> {
    rest: &'a [u8],
}

impl<'a> Operands<'a> {
    fn next(&mut self) -> Result<String, CodecError> {
        if self.rest.len() < 4 {
            return Err(CodecError::Truncated);
        }
        let (len_bytes, rest) = self.rest.split_at(4);
        let len = u32::from_le_bytes(len_bytes.try_into().expect("split_at(4)")) as usize;
        if rest.len() < len {
            return Err(CodecError::Truncated);
        }
        let (operand, rest) = rest.split_at(len);
        self.rest = rest;
        String::from_utf8(operand.to_vec()).map_err(|_| CodecError::BadOperand)
    }

    fn finish(self) -> Result<(), CodecError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(CodecError::BadOperand)
        }
    }
}

/// Decodes a wire frame back into an action. Exactly one action per frame;
/// trailing bytes are an error.
pub fn decode(frame: &[u8]) -> Result<Action, CodecError> {
    let (verb, rest) = frame.split_first().ok_or(CodecError::Truncated)?;
    let mut operands = Operands { rest };
    let action = match *verb {
        ADD_APP => Action::AddApp {
            name: operands.next()?,
            kind: operands.next()?,
            config: operands.next()?,
        },
        REMOVE_APP => Action::RemoveApp {
            name: operands.next()?,
        },
        RECONFIG_APP => Action::ReconfigApp {
            name: operands.next()?,
            config: operands.next()?,
        },
        LINK => Action::Link {
            spec: operands.next()?,
        },
        UNLINK => Action::Unlink {
            spec: operands.next()?,
        },
        verb => return Err(CodecError::UnknownVerb(verb)),
    };
    operands.finish()?;
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Action> {
        vec![
            Action::AddApp {
                name: "nic".into(),
                kind: "intel_mp".into(),
                config: "{\"pciaddr\":\"82:00.0\"}".into(),
            },
            Action::RemoveApp { name: "nic".into() },
            Action::ReconfigApp {
                name: "filter".into(),
                config: "{}".into(),
            },
            Action::Link {
                spec: "nic.tx -> filter.input".into(),
            },
            Action::Unlink {
                spec: "filter.output -> nic.rx".into(),
            },
        ]
    }

    #[test]
    fn decode_inverts_encode() {
        for action in samples() {
            assert_eq!(decode(&encode(&action)).unwrap(), action);
        }
    }

    #[test]
    fn unknown_verb() {
        assert_eq!(decode(&[9]), Err(CodecError::UnknownVerb(9)));
        assert_eq!(decode(&[]), Err(CodecError::Truncated));
    }

    #[test]
    fn truncated_operand() {
        let mut frame = encode(&Action::RemoveApp { name: "nic".into() });
        frame.truncate(frame.len() - 1);
        assert_eq!(decode(&frame), Err(CodecError::Truncated));
        assert_eq!(decode(&[REMOVE_APP, 3, 0]), Err(CodecError::Truncated));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut frame = encode(&Action::RemoveApp { name: "nic".into() });
        frame.push(0);
        assert_eq!(decode(&frame), Err(CodecError::BadOperand));
    }

    #[test]
    fn non_utf8_operand_rejected() {
        let mut frame = vec![REMOVE_APP];
        frame.extend(2u32.to_le_bytes());
        frame.extend([0xff, 0xfe]);
        assert_eq!(decode(&frame), Err(CodecError::BadOperand));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn codec_roundtrips_any_operands(name in ".*", kind in ".*", config in ".*") {
            let action = Action::AddApp { name, kind, config };
            prop_assert_eq!(decode(&encode(&action)).unwrap(), action);
        }
    }
}
