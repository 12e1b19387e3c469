//! Scripted socket and reply builders for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::error::{Error, Result};
use super::genl::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL, GenlMsgHdr};
use super::message::{Message, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
use super::socket::SocketIo;

pub(crate) const TEST_PID: u32 = 4242;

#[derive(Default)]
struct Script {
    replies: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    timeout: Option<Duration>,
}

/// A socket that replays queued datagrams and records what was sent.
///
/// Clones share the same script, so a test can keep a handle after moving
/// the socket into a connection. An empty script behaves like an expired
/// receive timeout.
#[derive(Clone, Default)]
pub(crate) struct ScriptedSocket {
    script: Rc<RefCell<Script>>,
}

impl ScriptedSocket {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue one datagram.
    pub(crate) fn push(&self, datagram: Vec<u8>) {
        self.script.borrow_mut().replies.push_back(datagram);
    }

    /// Queue several frames as a single datagram.
    pub(crate) fn push_batch(&self, frames: &[Vec<u8>]) {
        self.push(frames.concat());
    }

    /// Messages sent so far.
    pub(crate) fn sent(&self) -> Vec<Message> {
        self.script
            .borrow()
            .sent
            .iter()
            .map(|bytes| Message::from_bytes(bytes).unwrap())
            .collect()
    }

    /// Datagrams not yet received.
    pub(crate) fn queued(&self) -> usize {
        self.script.borrow().replies.len()
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.script.borrow().timeout
    }
}

impl SocketIo for ScriptedSocket {
    fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.script.borrow_mut().sent.push(msg.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        self.script
            .borrow_mut()
            .replies
            .pop_front()
            .ok_or(Error::Timeout)
    }

    fn pid(&self) -> u32 {
        TEST_PID
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.script.borrow_mut().timeout = timeout;
        Ok(())
    }
}

fn base(msg_type: u16, seq: u32) -> Message {
    let mut msg = Message::new(msg_type, 0);
    msg.set_seq(seq);
    msg.set_pid(TEST_PID);
    msg
}

/// `NLMSG_ERROR` frame; `errno` is positive, 0 for an ACK.
pub(crate) fn error(seq: u32, errno: i32) -> Vec<u8> {
    let mut msg = base(NlMsgType::ERROR, seq);
    let mut payload = errno.wrapping_neg().to_ne_bytes().to_vec();
    let mut original = NlMsgHdr::new(0x20, 0);
    original.nlmsg_seq = seq;
    payload.extend_from_slice(original.as_bytes());
    msg.append_bytes(&payload);
    msg.into_bytes()
}

pub(crate) fn ack(seq: u32) -> Vec<u8> {
    error(seq, 0)
}

/// Frame of a control type (NOOP, DONE, OVERRUN) with no payload.
pub(crate) fn control(msg_type: u16, seq: u32) -> Vec<u8> {
    base(msg_type, seq).into_bytes()
}

/// Data frame without a protocol header.
pub(crate) fn data(msg_type: u16, seq: u32, attrs: &[(u16, &[u8])]) -> Vec<u8> {
    let mut msg = base(msg_type, seq);
    for (kind, payload) in attrs {
        msg.put_attr(*kind, payload).unwrap();
    }
    msg.into_bytes()
}

/// Data frame carrying a generic header.
pub(crate) fn genl_data(
    family: u16,
    seq: u32,
    cmd: u8,
    version: u8,
    attrs: &[(u16, &[u8])],
) -> Vec<u8> {
    let mut msg = base(family, seq);
    msg.append(GenlMsgHdr::new(cmd, version).as_bytes(), NLMSG_HDRLEN)
        .unwrap();
    for (kind, payload) in attrs {
        msg.put_attr(*kind, payload).unwrap();
    }
    msg.into_bytes()
}

/// `CTRL_CMD_NEWFAMILY` reply as sent for a `CTRL_CMD_GETFAMILY` request.
pub(crate) fn family_reply(
    seq: u32,
    name: &str,
    id: u16,
    version: u32,
    groups: &[(&str, u32)],
) -> Vec<u8> {
    let mut msg = base(GENL_ID_CTRL, seq);
    msg.append(
        GenlMsgHdr::new(CtrlCmd::NewFamily as u8, 2).as_bytes(),
        NLMSG_HDRLEN,
    )
    .unwrap();
    msg.put_str(CtrlAttr::FamilyName as u16, name).unwrap();
    msg.put_u16(CtrlAttr::FamilyId as u16, id).unwrap();
    msg.put_u32(CtrlAttr::Version as u16, version).unwrap();
    msg.put_u32(CtrlAttr::HdrSize as u16, 0).unwrap();
    msg.put_u32(CtrlAttr::MaxAttr as u16, 3).unwrap();
    if !groups.is_empty() {
        let outer = msg.nest_start(CtrlAttr::McastGroups as u16);
        for (i, (group, group_id)) in groups.iter().enumerate() {
            let entry = msg.nest_start(i as u16 + 1);
            msg.put_str(CtrlAttrMcastGrp::Name as u16, group).unwrap();
            msg.put_u32(CtrlAttrMcastGrp::Id as u16, *group_id).unwrap();
            msg.nest_end(entry).unwrap();
        }
        msg.nest_end(outer).unwrap();
    }
    msg.into_bytes()
}
