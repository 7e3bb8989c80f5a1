//! Monitor layout through the RandR extension

use crate::window::Region;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};
use x11rb::protocol::xproto::Screen;

/// Active CRTCs of `screen` with at least one connected output, in root
/// coordinates. Falls back to the whole screen.
pub(crate) fn monitors<C: Connection>(conn: &C, screen: &Screen) -> Vec<Region> {
    let monitors = match randr_monitors(conn, screen) {
        Ok(monitors) => monitors,
        Err(e) => {
            debug!("RandR unavailable on root {:#x}: {}", screen.root, e);
            Vec::new()
        }
    };
    if monitors.is_empty() {
        return vec![Region::new(
            0,
            0,
            screen.width_in_pixels.into(),
            screen.height_in_pixels.into(),
        )];
    }
    monitors
}

fn randr_monitors<C: Connection>(conn: &C, screen: &Screen) -> crate::Result<Vec<Region>> {
    let resources = conn.randr_get_screen_resources(screen.root)?.reply()?;

    let mut monitors = Vec::new();
    for &crtc in &resources.crtcs {
        let info = conn
            .randr_get_crtc_info(crtc, resources.config_timestamp)?
            .reply()?;
        if info.outputs.is_empty() || info.width == 0 || info.height == 0 {
            continue;
        }

        let connected = info.outputs.iter().any(|&output| {
            conn.randr_get_output_info(output, resources.config_timestamp)
                .map_err(x11rb::errors::ReplyError::from)
                .and_then(|cookie| cookie.reply())
                .is_ok_and(|output| output.connection == randr::Connection::CONNECTED)
        });
        if !connected {
            continue;
        }

        monitors.push(Region::new(
            info.x.into(),
            info.y.into(),
            info.width.into(),
            info.height.into(),
        ));
    }
    Ok(monitors)
}
