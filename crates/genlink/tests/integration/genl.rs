//! Generic netlink tests against the kernel's control family.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use genlink::netlink::genl::{
    CtrlAttr, CtrlCmd, GENL_CTRL_NAME, GENL_ID_CTRL, GenericNetLink,
};
use genlink::netlink::message::NLM_F_ACK;
use genlink::netlink::{CbKind, CbType, Config, Error, PolicySet};
use genlink::Result;

use crate::common::test_config;

#[test]
fn test_resolve_nlctrl() -> Result<()> {
    require_genl!();

    let conn = GenericNetLink::open_with_config(GENL_CTRL_NAME, PolicySet::new(), test_config())?;
    assert_eq!(conn.family_id(), GENL_ID_CTRL);
    assert_eq!(conn.family_name(), GENL_CTRL_NAME);
    assert!(conn.family().version >= 1);
    assert!(conn.group_id("notify").is_ok());

    Ok(())
}

#[test]
fn test_missing_family() -> Result<()> {
    require_genl!();

    let err = GenericNetLink::open_with_config(
        "genlink_no_such_family",
        PolicySet::new(),
        test_config(),
    )
    .unwrap_err();
    assert!(
        matches!(err, Error::FamilyNotFound { ref name } if name == "genlink_no_such_family"),
        "unexpected error: {err}"
    );

    Ok(())
}

#[test]
fn test_recv_times_out() -> Result<()> {
    require_genl!();

    let config = Config::new().recv_timeout(Duration::from_millis(100));
    let mut conn = GenericNetLink::open_with_config(GENL_CTRL_NAME, PolicySet::new(), config)?;
    assert!(conn.recv().unwrap_err().is_timeout());

    Ok(())
}

#[test]
fn test_getfamily_through_callbacks() -> Result<()> {
    require_genl!();

    let mut conn = GenericNetLink::open_with_config(GENL_CTRL_NAME, PolicySet::new(), test_config())?;
    let ids = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&ids);
    conn.modify_cb(CbType::Valid, CbKind::Custom, move |_, msg| {
        assert_eq!(msg.cmd(), Some(CtrlCmd::NewFamily as u8));
        if let Some(attr) = msg.attr(CtrlAttr::FamilyId as u16) {
            sink.borrow_mut().push(attr.as_u16()?);
        }
        Ok(())
    });

    let mut msg = conn.message(CtrlCmd::GetFamily as u8, NLM_F_ACK);
    msg.put_str(CtrlAttr::FamilyName as u16, GENL_CTRL_NAME)?;
    conn.send(&mut msg)?;

    assert_eq!(conn.recv()?.cb_type, CbType::Valid);
    assert_eq!(conn.recv()?.cb_type, CbType::Ack);
    assert_eq!(*ids.borrow(), vec![GENL_ID_CTRL]);

    conn.close();
    assert!(matches!(conn.recv(), Err(Error::Closed)));
    Ok(())
}
