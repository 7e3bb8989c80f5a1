//! X11 pixel grabbing through MIT-SHM, with a plain GetImage fallback

use super::connection::X11Connection;
use crate::capture::{ByteOrder, GrabTarget, PixelGrabber, RawImage};
use crate::error::{Error, Result};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::shm::{self, ConnectionExt as ShmExt};
use x11rb::protocol::xproto::{ConnectionExt, Drawable, ImageFormat, ImageOrder};

/// A shared memory segment attached to the server and mapped locally
struct ShmSegment {
    seg: shm::Seg,
    addr: NonNull<c_void>,
    size: usize,
}

// SAFETY: the mapping is only read while the owning mutex is held and is
// unmapped exactly once, in `unmap`.
unsafe impl Send for ShmSegment {}

impl ShmSegment {
    fn create(conn: &X11Connection, size: usize) -> Result<Self> {
        let len = NonZeroUsize::new(size).ok_or_else(|| Error::PixelLayout("empty screen".to_string()))?;
        let request_size = u32::try_from(size)
            .map_err(|_| Error::PixelLayout(format!("{} bytes is too large for MIT-SHM", size)))?;
        let seg = conn.conn().generate_id()?;
        let reply = conn
            .conn()
            .shm_create_segment(seg, request_size, false)?
            .reply()?;
        // SAFETY: the server just created this segment with `size` bytes;
        // the fd may be closed once mapped.
        let addr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                &reply.shm_fd,
                0,
            )
        };
        let addr = match addr {
            Ok(addr) => addr,
            Err(e) => {
                let _ = conn.conn().shm_detach(seg);
                return Err(e.into());
            }
        };
        Ok(Self { seg, addr, size })
    }

    fn bytes(&self, len: usize) -> &[u8] {
        let len = len.min(self.size);
        // SAFETY: `addr` points to `size` mapped, readable bytes for as
        // long as `self` is alive.
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr().cast::<u8>(), len) }
    }

    fn unmap(self, conn: &X11Connection) {
        if let Err(e) = conn.conn().shm_detach(self.seg) {
            debug!("Failed to detach shared memory segment: {}", e);
        }
        // SAFETY: the mapping was created in `create` with this length and
        // is not referenced anywhere else.
        if let Err(e) = unsafe { munmap(self.addr, self.size) } {
            warn!("Failed to unmap shared memory segment: {}", e);
        }
    }
}

enum ShmState {
    /// Not tried yet, or released
    Idle,
    Unavailable,
    Ready(ShmSegment),
}

pub struct X11Grabber {
    conn: Arc<X11Connection>,
    use_shm: bool,
    shm: Mutex<ShmState>,
}

impl X11Grabber {
    pub fn new(conn: Arc<X11Connection>, use_shm: bool) -> Self {
        Self {
            conn,
            use_shm,
            shm: Mutex::new(ShmState::Idle),
        }
    }

    /// Bytes needed for the largest screen at 32 bits per pixel
    fn segment_size(&self) -> usize {
        self.conn
            .conn()
            .setup()
            .roots
            .iter()
            .map(|s| s.width_in_pixels as usize * s.height_in_pixels as usize * 4)
            .max()
            .unwrap_or(0)
    }

    fn open_segment(&self) -> ShmState {
        let conn = self.conn.conn();
        let supported = conn
            .extension_information(shm::X11_EXTENSION_NAME)
            .ok()
            .flatten()
            .is_some();
        if !supported {
            info!("MIT-SHM not available, using GetImage");
            return ShmState::Unavailable;
        }
        let version = conn
            .shm_query_version()
            .map_err(Error::from)
            .and_then(|cookie| cookie.reply().map_err(Error::from));
        if let Err(e) = version {
            info!("MIT-SHM query failed ({}), using GetImage", e);
            return ShmState::Unavailable;
        }
        match ShmSegment::create(&self.conn, self.segment_size()) {
            Ok(segment) => {
                debug!("Attached {} byte shared memory segment", segment.size);
                ShmState::Ready(segment)
            }
            Err(e) => {
                warn!("Failed to set up shared memory segment, using GetImage: {}", e);
                ShmState::Unavailable
            }
        }
    }

    fn byte_order(&self) -> ByteOrder {
        if self.conn.conn().setup().image_byte_order == ImageOrder::MSB_FIRST {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        }
    }

    /// Bits per pixel and scanline stride for `depth` from the setup's
    /// pixmap formats
    fn layout(&self, depth: u8, width: u16) -> Result<(u8, usize)> {
        let format = self
            .conn
            .conn()
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .ok_or_else(|| Error::PixelLayout(format!("no pixmap format for depth {}", depth)))?;
        let bits = format.bits_per_pixel as usize * width as usize;
        let pad = format.scanline_pad.max(8) as usize;
        let stride = bits.div_ceil(pad) * pad / 8;
        Ok((format.bits_per_pixel, stride))
    }

    fn to_raw(&self, depth: u8, width: u16, height: u16, data: Vec<u8>) -> Result<RawImage> {
        let (bits_per_pixel, stride) = self.layout(depth, width)?;
        Ok(RawImage {
            width: width.into(),
            height: height.into(),
            bits_per_pixel,
            stride,
            byte_order: self.byte_order(),
            data,
        })
    }

    fn get_image(&self, drawable: Drawable, x: i16, y: i16, width: u16, height: u16) -> Result<RawImage> {
        let reply = self
            .conn
            .conn()
            .get_image(ImageFormat::Z_PIXMAP, drawable, x, y, width, height, !0)?
            .reply()?;
        self.to_raw(reply.depth, width, height, reply.data)
    }
}

/// Drawable and wire-sized rectangle for a grab
fn wire_rect(target: &GrabTarget, default_root: Drawable) -> Result<(Drawable, i16, i16, u16, u16)> {
    let (drawable, x, y, width, height) = match *target {
        GrabTarget::Window { window, width, height } => (window, 0, 0, width, height),
        GrabTarget::Region(region) => (default_root, region.x, region.y, region.width, region.height),
    };
    let out_of_range = || Error::InvalidConfig("capture area exceeds the X11 coordinate range");
    Ok((
        drawable,
        i16::try_from(x).map_err(|_| out_of_range())?,
        i16::try_from(y).map_err(|_| out_of_range())?,
        u16::try_from(width).map_err(|_| out_of_range())?,
        u16::try_from(height).map_err(|_| out_of_range())?,
    ))
}

impl PixelGrabber for X11Grabber {
    fn grab(&self, target: &GrabTarget) -> Result<RawImage> {
        let (drawable, x, y, width, height) = wire_rect(target, self.conn.default_root())?;
        if !self.use_shm {
            return self.get_image(drawable, x, y, width, height);
        }

        // one transfer at a time through the segment
        let mut shm = self.shm.lock();
        if matches!(*shm, ShmState::Idle) {
            *shm = self.open_segment();
        }
        let ShmState::Ready(segment) = &*shm else {
            drop(shm);
            return self.get_image(drawable, x, y, width, height);
        };
        let needed = width as usize * height as usize * 4;
        if needed > segment.size {
            debug!("{} bytes do not fit the shared segment, using GetImage", needed);
            drop(shm);
            return self.get_image(drawable, x, y, width, height);
        }

        let reply = self
            .conn
            .conn()
            .shm_get_image(
                drawable,
                x,
                y,
                width,
                height,
                !0,
                ImageFormat::Z_PIXMAP.into(),
                segment.seg,
                0,
            )?
            .reply()?;
        let data = segment.bytes(reply.size as usize).to_vec();
        drop(shm);
        self.to_raw(reply.depth, width, height, data)
    }

    fn release(&self) {
        let mut shm = self.shm.lock();
        if let ShmState::Ready(segment) = std::mem::replace(&mut *shm, ShmState::Idle) {
            segment.unmap(&self.conn);
            if let Err(e) = self.conn.conn().flush() {
                debug!("Flush after detaching shared memory failed: {}", e);
            }
            info!("Released shared memory segment");
        }
    }
}

impl Drop for X11Grabber {
    fn drop(&mut self) {
        self.release();
    }
}
