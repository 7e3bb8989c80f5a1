//! Classification of raw X11 events

use crate::events::ModifierState;
use crate::server::WireEvent;
use crate::window::Region;
use tracing::{debug, error};
use x11rb::protocol::xproto::{Atom, AtomEnum, KeyButMask, NotifyDetail, Property};
use x11rb::protocol::Event;

/// Maps an X11 event to the subset the tracker understands. Everything else
/// is logged and dropped.
pub(crate) fn classify(event: Event, net_wm_name: Atom) -> Option<WireEvent> {
    match event {
        Event::EnterNotify(e) if !is_inferior(e.detail) => Some(WireEvent::Enter {
            window: e.event,
            x: e.event_x.into(),
            y: e.event_y.into(),
        }),
        Event::LeaveNotify(e) if !is_inferior(e.detail) => Some(WireEvent::Leave {
            window: e.event,
            x: e.event_x.into(),
            y: e.event_y.into(),
        }),
        Event::CreateNotify(e) => Some(WireEvent::Create {
            window: e.window,
            parent: e.parent,
        }),
        Event::DestroyNotify(e) => Some(WireEvent::Destroy { window: e.window }),
        Event::ConfigureNotify(e) => Some(WireEvent::Configure {
            window: e.window,
            region: Region::new(e.x.into(), e.y.into(), e.width.into(), e.height.into()),
        }),
        Event::PropertyNotify(e) if is_title_change(e.state, e.atom, net_wm_name) => {
            Some(WireEvent::TitleChanged { window: e.window })
        }
        Event::MotionNotify(e) => Some(WireEvent::Motion {
            window: e.event,
            x: e.event_x.into(),
            y: e.event_y.into(),
            root_x: e.root_x.into(),
            root_y: e.root_y.into(),
        }),
        Event::ButtonPress(e) => Some(WireEvent::ButtonPress {
            window: e.event,
            x: e.event_x.into(),
            y: e.event_y.into(),
            button: e.detail,
            modifiers: modifiers(e.state),
        }),
        Event::ButtonRelease(e) => Some(WireEvent::ButtonRelease {
            window: e.event,
            x: e.event_x.into(),
            y: e.event_y.into(),
            button: e.detail,
            modifiers: modifiers(e.state),
        }),
        Event::Error(e) => {
            error!("X11 protocol error: {:?}", e);
            None
        }
        other => {
            debug!("Dropping event {:?}", other);
            None
        }
    }
}

/// Crossings between a window and its own children
fn is_inferior(detail: NotifyDetail) -> bool {
    detail == NotifyDetail::INFERIOR
}

fn is_title_change(state: Property, atom: Atom, net_wm_name: Atom) -> bool {
    state == Property::NEW_VALUE && (atom == net_wm_name || atom == Atom::from(AtomEnum::WM_NAME))
}

/// Control, Mod1 (Alt), Shift and Mod4 (Super)
fn modifiers(state: KeyButMask) -> ModifierState {
    let bits = u16::from(state);
    let has = |mask: KeyButMask| bits & u16::from(mask) != 0;
    ModifierState {
        ctrl: has(KeyButMask::CONTROL),
        alt: has(KeyButMask::MOD1),
        shift: has(KeyButMask::SHIFT),
        meta: has(KeyButMask::MOD4),
    }
}
