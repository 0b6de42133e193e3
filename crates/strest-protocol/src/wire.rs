//! The fixed wire-id tables used by the binary frame format. Each enum's
//! discriminant is its position in the corresponding table in
//! `cheshire/protocol_bin.go`; an id outside the table is a decode error.

use crate::error::ProtocolError;

macro_rules! wire_enum {
    ($name:ident { $($variant:ident = $id:expr => $wire:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn wire_id(self) -> i8 {
                match self {
                    $(Self::$variant => $id),+
                }
            }

            pub fn from_wire_id(id: i8) -> Result<Self, ProtocolError> {
                match id {
                    $($id => Ok(Self::$variant)),+,
                    other => Err(ProtocolError::UnknownWireId {
                        table: stringify!($name),
                        id: other,
                    }),
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            pub fn from_str(s: &str) -> Result<Self, ProtocolError> {
                match s {
                    $($wire => Ok(Self::$variant)),+,
                    other => Err(ProtocolError::UnknownWireName {
                        table: stringify!($name),
                        name: other.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum!(TxnAccept {
    Single = 0 => "single",
    Multi = 1 => "multi",
});

wire_enum!(TxnStatus {
    Completed = 0 => "completed",
    Continue = 1 => "continue",
});

wire_enum!(Method {
    Get = 0 => "GET",
    Post = 1 => "POST",
    Put = 2 => "PUT",
    Delete = 3 => "DELETE",
});

wire_enum!(ParamEncoding {
    Json = 0 => "json",
    MsgPack = 1 => "msgpack",
});

wire_enum!(ContentEncoding {
    StringEnc = 0 => "string",
    Bytes = 1 => "bytes",
    Json = 2 => "json",
    MsgPack = 3 => "msgpack",
});

impl Default for TxnAccept {
    fn default() -> Self {
        TxnAccept::Single
    }
}

impl Default for ParamEncoding {
    fn default() -> Self {
        ParamEncoding::Json
    }
}

impl Default for ContentEncoding {
    fn default() -> Self {
        ContentEncoding::Bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_match_original_table_order() {
        assert_eq!(TxnAccept::Single.wire_id(), 0);
        assert_eq!(TxnAccept::Multi.wire_id(), 1);
        assert_eq!(Method::Delete.wire_id(), 3);
        assert_eq!(ContentEncoding::MsgPack.wire_id(), 3);
        assert_eq!(ContentEncoding::MsgPack.as_str(), "msgpack");
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert!(Method::from_wire_id(9).is_err());
    }
}
