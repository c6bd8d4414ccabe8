/// Wire format shared by the relay server and its clients.
///
/// Every frame is one JSON object `{"type": <kind>, "data": <payload>}`.
/// Payloads carry the sender's id except for the pre-handshake kinds.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use textmode::{BlockRegion, Cell, CompressedDocument};

use crate::{PeerId, Result, Status};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    Connected(ConnectedData),
    Refused,
    Join(PeerInfo),
    Leave(PeerRef),
    Cursor(PointData),
    Selection(PointData),
    ResizeSelection(PointData),
    Operation(PointData),
    HideCursor(PeerRef),
    Draw(DrawData),
    Chat(ChatData),
    Status(StatusData),
    Sauce(SauceData),
    IceColors(FlagData),
    #[serde(rename = "use_9px_font")]
    Use9pxFont(FlagData),
    ChangeFont(FontData),
    SetCanvasSize(CanvasSizeData),
    PasteAsSelection(PasteData),
    Rotate(PeerRef),
    FlipX(PeerRef),
    FlipY(PeerRef),
}

/// `Connected` travels both ways: a handshake from the client, a welcome
/// with the snapshot from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectedData {
    Welcome(Welcome),
    Handshake(Handshake),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    /// Browser viewers: no presence timer, status `web`.
    #[serde(default)]
    pub web: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub id: PeerId,
    pub status: Status,
    pub doc: CompressedDocument,
    #[serde(default)]
    pub chat_history: Vec<ChatEntry>,
    pub users: Vec<PeerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRef {
    #[serde(default)]
    pub id: PeerId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointData {
    #[serde(default)]
    pub id: PeerId,
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawData {
    #[serde(default)]
    pub id: PeerId,
    pub x: usize,
    pub y: usize,
    pub block: Cell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatData {
    #[serde(default)]
    pub id: PeerId,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub text: String,
}

/// A chat line as the server keeps it for late joiners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub chat: ChatData,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub id: PeerId,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SauceData {
    #[serde(default)]
    pub id: PeerId,
    pub title: String,
    pub author: String,
    pub group: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagData {
    #[serde(default)]
    pub id: PeerId,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontData {
    #[serde(default)]
    pub id: PeerId,
    pub font_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSizeData {
    #[serde(default)]
    pub id: PeerId,
    pub columns: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteData {
    #[serde(default)]
    pub id: PeerId,
    pub blocks: BlockRegion,
}

impl Message {
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the action, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Connected(_) => "connected",
            Message::Refused => "refused",
            Message::Join(_) => "join",
            Message::Leave(_) => "leave",
            Message::Cursor(_) => "cursor",
            Message::Selection(_) => "selection",
            Message::ResizeSelection(_) => "resize_selection",
            Message::Operation(_) => "operation",
            Message::HideCursor(_) => "hide_cursor",
            Message::Draw(_) => "draw",
            Message::Chat(_) => "chat",
            Message::Status(_) => "status",
            Message::Sauce(_) => "sauce",
            Message::IceColors(_) => "ice_colors",
            Message::Use9pxFont(_) => "use_9px_font",
            Message::ChangeFont(_) => "change_font",
            Message::SetCanvasSize(_) => "set_canvas_size",
            Message::PasteAsSelection(_) => "paste_as_selection",
            Message::Rotate(_) => "rotate",
            Message::FlipX(_) => "flip_x",
            Message::FlipY(_) => "flip_y",
        }
    }

    fn sender_mut(&mut self) -> Option<&mut PeerId> {
        match self {
            Message::Connected(_) | Message::Refused => None,
            Message::Join(data) => Some(&mut data.id),
            Message::Leave(data)
            | Message::HideCursor(data)
            | Message::Rotate(data)
            | Message::FlipX(data)
            | Message::FlipY(data) => Some(&mut data.id),
            Message::Cursor(data)
            | Message::Selection(data)
            | Message::ResizeSelection(data)
            | Message::Operation(data) => Some(&mut data.id),
            Message::Draw(data) => Some(&mut data.id),
            Message::Chat(data) => Some(&mut data.id),
            Message::Status(data) => Some(&mut data.id),
            Message::Sauce(data) => Some(&mut data.id),
            Message::IceColors(data) | Message::Use9pxFont(data) => Some(&mut data.id),
            Message::ChangeFont(data) => Some(&mut data.id),
            Message::SetCanvasSize(data) => Some(&mut data.id),
            Message::PasteAsSelection(data) => Some(&mut data.id),
        }
    }

    /// The peer the action is attributed to; `None` before the handshake completes.
    pub fn sender(&self) -> Option<PeerId> {
        match self {
            Message::Connected(_) | Message::Refused => None,
            Message::Join(data) => Some(data.id),
            Message::Leave(data)
            | Message::HideCursor(data)
            | Message::Rotate(data)
            | Message::FlipX(data)
            | Message::FlipY(data) => Some(data.id),
            Message::Cursor(data)
            | Message::Selection(data)
            | Message::ResizeSelection(data)
            | Message::Operation(data) => Some(data.id),
            Message::Draw(data) => Some(data.id),
            Message::Chat(data) => Some(data.id),
            Message::Status(data) => Some(data.id),
            Message::Sauce(data) => Some(data.id),
            Message::IceColors(data) | Message::Use9pxFont(data) => Some(data.id),
            Message::ChangeFont(data) => Some(data.id),
            Message::SetCanvasSize(data) => Some(data.id),
            Message::PasteAsSelection(data) => Some(data.id),
        }
    }

    pub fn set_sender(&mut self, id: PeerId) {
        if let Some(sender) = self.sender_mut() {
            *sender = id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_type_and_data() {
        let msg = Message::Draw(DrawData {
            id: PeerId(3),
            x: 1,
            y: 2,
            block: Cell::new(65, 7, 0),
        });
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "draw");
        assert_eq!(value["data"]["id"], 3);
        assert_eq!(value["data"]["block"]["code"], 65);

        let flag = Message::Use9pxFont(FlagData {
            id: PeerId(1),
            value: true,
        });
        assert!(flag.encode().unwrap().contains("\"use_9px_font\""));
    }

    #[test]
    fn test_handshake_and_welcome_share_connected() {
        let text = r#"{"type":"connected","data":{"nick":"ansi","group":"blocktronics","pass":"secret"}}"#;
        match Message::decode(text).unwrap() {
            Message::Connected(ConnectedData::Handshake(handshake)) => {
                assert_eq!(handshake.nick.as_deref(), Some("ansi"));
                assert_eq!(handshake.pass.as_deref(), Some("secret"));
                assert!(!handshake.web);
            }
            other => panic!("expected handshake, got {:?}", other),
        }

        let welcome = Message::Connected(ConnectedData::Welcome(Welcome {
            id: PeerId(7),
            status: Status::Active,
            doc: textmode::compress(&textmode::Document::new(2, 2).unwrap()),
            chat_history: Vec::new(),
            users: Vec::new(),
        }));
        let decoded = Message::decode(&welcome.encode().unwrap()).unwrap();
        assert_eq!(decoded, welcome);
    }

    #[test]
    fn test_refused_has_no_payload() {
        assert_eq!(Message::Refused.encode().unwrap(), r#"{"type":"refused"}"#);
        assert_eq!(
            Message::decode(r#"{"type":"refused"}"#).unwrap(),
            Message::Refused
        );
    }

    #[test]
    fn test_set_sender_stamps_payload() {
        let mut msg = Message::HideCursor(PeerRef::default());
        msg.set_sender(PeerId(9));
        assert_eq!(msg.sender(), Some(PeerId(9)));

        let mut refused = Message::Refused;
        refused.set_sender(PeerId(9));
        assert_eq!(refused.sender(), None);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(Message::decode("not json").is_err());
        assert!(Message::decode(r#"{"type":"teleport","data":{}}"#).is_err());
        assert!(Message::decode(r#"{"type":"draw","data":{"x":1}}"#).is_err());
    }
}
