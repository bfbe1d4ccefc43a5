//! Platform source manager backend (Windows).
//!
//! Loads the source manager library at runtime and marshals the engine's
//! typed structures into the packed C layouts `DSM_Entry` expects.

use std::ffi::{OsStr, c_void};
use std::ptr;

use libloading::Library;
use tracing::{debug, info, trace, warn};
use windows_sys::Win32::Foundation::{HGLOBAL, POINT};
use windows_sys::Win32::System::Memory::{
    GHND, GlobalAlloc, GlobalFree, GlobalLock, GlobalSize, GlobalUnlock,
};
use windows_sys::Win32::UI::WindowsAndMessaging::MSG;

use super::traits::{DsmTransport, NativeImage};
use crate::error::{Result, TwainError};
use crate::protocol::constants::*;
use crate::protocol::{
    ApplicationIdentity, CapValue, CapabilityData, ConditionCode, EventOutcome, Fix32, Frame,
    ImageInfo, ImageLayout, ItemType, MemXferChunk, Msg, PendingXfers, PixelType, RawEvent,
    ReturnCode, SetupMemXfer, SourceIdentity, Status, UserInterface, Version, WindowHandle,
};

#[cfg(target_pointer_width = "64")]
const LIBRARIES: &[&str] = &["TWAINDSM.dll"];
#[cfg(not(target_pointer_width = "64"))]
const LIBRARIES: &[&str] = &["TWAINDSM.dll", "twain_32.dll"];

type DsmEntry = unsafe extern "system" fn(
    origin: *mut TwIdentity,
    dest: *mut TwIdentity,
    dg: u32,
    dat: u16,
    msg: u16,
    data: *mut c_void,
) -> u16;

// Wire layouts. Every structure is 2-byte packed on this platform.

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwVersion {
    major_num: u16,
    minor_num: u16,
    language: u16,
    country: u16,
    info: [u8; 34],
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwIdentity {
    id: u32,
    version: TwVersion,
    protocol_major: u16,
    protocol_minor: u16,
    supported_groups: u32,
    manufacturer: [u8; 34],
    product_family: [u8; 34],
    product_name: [u8; 34],
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwFix32 {
    whole: i16,
    frac: u16,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwFrame {
    left: TwFix32,
    top: TwFix32,
    right: TwFix32,
    bottom: TwFix32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwCapability {
    cap: u16,
    con_type: u16,
    container: HGLOBAL,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwOneValue {
    item_type: u16,
    item: u32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwUserInterface {
    show_ui: u16,
    modal_ui: u16,
    parent: *mut c_void,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwImageInfo {
    x_resolution: TwFix32,
    y_resolution: TwFix32,
    image_width: i32,
    image_length: i32,
    samples_per_pixel: i16,
    bits_per_sample: [i16; 8],
    bits_per_pixel: i16,
    planar: u16,
    pixel_type: i16,
    compression: u16,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwImageLayout {
    frame: TwFrame,
    document_number: u32,
    page_number: u32,
    frame_number: u32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwPendingXfers {
    count: u16,
    eoj: u32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwSetupMemXfer {
    min_buf_size: u32,
    max_buf_size: u32,
    preferred: u32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwMemory {
    flags: u32,
    length: u32,
    the_mem: *mut c_void,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwImageMemXfer {
    compression: u16,
    bytes_per_row: u32,
    columns: u32,
    rows: u32,
    x_offset: u32,
    y_offset: u32,
    bytes_written: u32,
    memory: TwMemory,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwEvent {
    event: *mut c_void,
    message: u16,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwStatus {
    condition_code: u16,
    data: u16,
}

fn to_str32(value: &str) -> [u8; 34] {
    let mut out = [0u8; 34];
    let bytes = value.as_bytes();
    let len = bytes.len().min(32);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

fn from_str32(raw: &[u8; 34]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl From<&Version> for TwVersion {
    fn from(v: &Version) -> Self {
        Self {
            major_num: v.major,
            minor_num: v.minor,
            language: v.language,
            country: v.country,
            info: to_str32(&v.info),
        }
    }
}

impl From<TwVersion> for Version {
    fn from(v: TwVersion) -> Self {
        let info = v.info;
        Self {
            major: v.major_num,
            minor: v.minor_num,
            language: v.language,
            country: v.country,
            info: from_str32(&info),
        }
    }
}

impl From<&ApplicationIdentity> for TwIdentity {
    fn from(app: &ApplicationIdentity) -> Self {
        Self {
            id: app.id,
            version: (&app.version).into(),
            protocol_major: app.protocol_major,
            protocol_minor: app.protocol_minor,
            supported_groups: app.supported_groups,
            manufacturer: to_str32(&app.manufacturer),
            product_family: to_str32(&app.product_family),
            product_name: to_str32(&app.product_name),
        }
    }
}

impl From<&SourceIdentity> for TwIdentity {
    fn from(source: &SourceIdentity) -> Self {
        Self {
            id: source.id,
            version: (&source.version).into(),
            protocol_major: source.protocol_major,
            protocol_minor: source.protocol_minor,
            supported_groups: source.supported_groups,
            manufacturer: to_str32(&source.manufacturer),
            product_family: to_str32(&source.product_family),
            product_name: to_str32(&source.product_name),
        }
    }
}

impl From<TwIdentity> for SourceIdentity {
    fn from(raw: TwIdentity) -> Self {
        let (manufacturer, family, name) = (raw.manufacturer, raw.product_family, raw.product_name);
        Self {
            id: raw.id,
            version: raw.version.into(),
            protocol_major: raw.protocol_major,
            protocol_minor: raw.protocol_minor,
            supported_groups: raw.supported_groups,
            manufacturer: from_str32(&manufacturer),
            product_family: from_str32(&family),
            product_name: from_str32(&name),
        }
    }
}

impl From<Fix32> for TwFix32 {
    fn from(v: Fix32) -> Self {
        Self {
            whole: v.whole,
            frac: v.frac,
        }
    }
}

impl From<TwFix32> for Fix32 {
    fn from(v: TwFix32) -> Self {
        Fix32::new(v.whole, v.frac)
    }
}

impl From<&Frame> for TwFrame {
    fn from(f: &Frame) -> Self {
        Self {
            left: f.left.into(),
            top: f.top.into(),
            right: f.right.into(),
            bottom: f.bottom.into(),
        }
    }
}

impl From<TwFrame> for Frame {
    fn from(f: TwFrame) -> Self {
        Self {
            left: f.left.into(),
            top: f.top.into(),
            right: f.right.into(),
            bottom: f.bottom.into(),
        }
    }
}

/// Owned global memory block, freed on drop.
struct GlobalBlock(HGLOBAL);

impl GlobalBlock {
    fn alloc(size: usize) -> Option<Self> {
        let handle = unsafe { GlobalAlloc(GHND, size) };
        Self::from_raw(handle)
    }

    fn from_raw(handle: HGLOBAL) -> Option<Self> {
        (!handle.is_null()).then_some(Self(handle))
    }

    /// Run `f` against the locked block, unlocking afterwards.
    fn with_locked<R>(&self, f: impl FnOnce(*mut u8) -> R) -> Option<R> {
        let ptr = unsafe { GlobalLock(self.0) } as *mut u8;
        if ptr.is_null() {
            return None;
        }
        let result = f(ptr);
        unsafe { GlobalUnlock(self.0) };
        Some(result)
    }
}

impl Drop for GlobalBlock {
    fn drop(&mut self) {
        unsafe {
            GlobalFree(self.0);
        }
    }
}

/// Device-independent bitmap returned by a native transfer.
///
/// Stays locked for its lifetime; dropping it unlocks and frees the handle.
struct NativeDib {
    block: GlobalBlock,
    ptr: *const u8,
    len: usize,
}

impl NativeDib {
    fn lock(handle: HGLOBAL) -> Option<Self> {
        let block = GlobalBlock::from_raw(handle)?;
        let len = unsafe { GlobalSize(block.0) };
        let ptr = unsafe { GlobalLock(block.0) } as *const u8;
        if ptr.is_null() {
            warn!("Native image handle could not be locked");
            return None;
        }
        Some(Self { block, ptr, len })
    }
}

impl NativeImage for NativeDib {
    fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for NativeDib {
    fn drop(&mut self) {
        unsafe {
            GlobalUnlock(self.block.0);
        }
    }
}

/// Source manager backed by the installed platform library.
pub struct NativeDsm {
    entry: DsmEntry,
    _library: Library,
}

impl NativeDsm {
    /// Load the first source manager library found on the search path.
    pub fn load() -> Result<Self> {
        let mut last = None;
        for name in LIBRARIES {
            match Self::load_from(name) {
                Ok(dsm) => return Ok(dsm),
                Err(e) => {
                    debug!(library = name, error = %e, "Source manager not loaded");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| TwainError::Library("no source manager library".into())))
    }

    pub fn load_from<P: AsRef<OsStr>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let library =
            unsafe { Library::new(path) }.map_err(|e| TwainError::Library(e.to_string()))?;
        let entry = unsafe { library.get::<DsmEntry>(b"DSM_Entry\0") }
            .map(|symbol| *symbol)
            .map_err(|e| TwainError::Library(e.to_string()))?;
        info!(library = %path.to_string_lossy(), "Source manager loaded");
        Ok(Self {
            entry,
            _library: library,
        })
    }

    fn call(
        &self,
        origin: &mut TwIdentity,
        dest: Option<&SourceIdentity>,
        dg: u32,
        dat: u16,
        msg: Msg,
        data: *mut c_void,
    ) -> ReturnCode {
        let mut dest = dest.map(TwIdentity::from);
        let dest_ptr = dest
            .as_mut()
            .map_or(ptr::null_mut(), |d| d as *mut TwIdentity);
        let rc = unsafe { (self.entry)(origin, dest_ptr, dg, dat, msg.raw(), data) };
        let rc = ReturnCode::from_raw(rc);
        trace!(dg, dat, msg = %msg, rc = %rc, "DSM_Entry");
        rc
    }

    fn call_source<D>(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        dg: u32,
        dat: u16,
        msg: Msg,
        data: &mut D,
    ) -> ReturnCode {
        let mut origin = TwIdentity::from(app);
        self.call(
            &mut origin,
            Some(source),
            dg,
            dat,
            msg,
            data as *mut D as *mut c_void,
        )
    }
}

impl DsmTransport for NativeDsm {
    fn parent(&self, app: &mut ApplicationIdentity, msg: Msg, window: WindowHandle) -> ReturnCode {
        let mut origin = TwIdentity::from(&*app);
        let mut hwnd = window.0 as *mut c_void;
        let rc = self.call(
            &mut origin,
            None,
            DG_CONTROL,
            DAT_PARENT,
            msg,
            &mut hwnd as *mut *mut c_void as *mut c_void,
        );
        if rc.is_success() && msg == Msg::OpenDsm {
            app.id = origin.id;
        }
        rc
    }

    fn identity(
        &self,
        app: &ApplicationIdentity,
        msg: Msg,
        source: &mut SourceIdentity,
    ) -> ReturnCode {
        let mut origin = TwIdentity::from(app);
        let mut raw = TwIdentity::from(&*source);
        let rc = self.call(
            &mut origin,
            None,
            DG_CONTROL,
            DAT_IDENTITY,
            msg,
            &mut raw as *mut TwIdentity as *mut c_void,
        );
        if rc.is_success() {
            *source = raw.into();
        }
        rc
    }

    fn status(&self, app: &ApplicationIdentity, source: Option<&SourceIdentity>) -> Status {
        let mut origin = TwIdentity::from(app);
        let mut raw = TwStatus::default();
        let rc = self.call(
            &mut origin,
            source,
            DG_CONTROL,
            DAT_STATUS,
            Msg::Get,
            &mut raw as *mut TwStatus as *mut c_void,
        );
        if !rc.is_success() {
            return Status {
                condition_code: ConditionCode::Bummer,
                data: 0,
            };
        }
        Status {
            condition_code: ConditionCode::from_raw(raw.condition_code),
            data: raw.data,
        }
    }

    fn capability(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        cap: &mut CapabilityData,
    ) -> ReturnCode {
        let container = match (msg, cap.value) {
            (Msg::Set, Some(value)) => {
                let Some(block) = GlobalBlock::alloc(std::mem::size_of::<TwOneValue>()) else {
                    return ReturnCode::Failure;
                };
                let one = TwOneValue {
                    item_type: value.item_type().raw(),
                    item: u32::from_le_bytes(value.to_item_bytes()),
                };
                if block
                    .with_locked(|p| unsafe { ptr::write_unaligned(p as *mut TwOneValue, one) })
                    .is_none()
                {
                    return ReturnCode::Failure;
                }
                Some(block)
            }
            _ => None,
        };

        let mut raw = TwCapability {
            cap: cap.cap,
            con_type: if container.is_some() {
                TWON_ONEVALUE
            } else {
                TWON_DONTCARE16
            },
            container: container.as_ref().map_or(ptr::null_mut(), |b| b.0),
        };
        let rc = self.call_source(app, source, DG_CONTROL, DAT_CAPABILITY, msg, &mut raw);

        if container.is_none() {
            // The source allocated the container; it is ours to free.
            let returned = GlobalBlock::from_raw(raw.container);
            if rc.is_success()
                && let Some(block) = returned
            {
                let con_type = raw.con_type;
                if con_type != TWON_ONEVALUE {
                    debug!(cap = cap.cap, con_type, "Non one-value container ignored");
                    return rc;
                }
                let one = block.with_locked(|p| unsafe { ptr::read_unaligned(p as *const TwOneValue) });
                cap.value = one.and_then(|one| {
                    let item_type = ItemType::from_raw(one.item_type)?;
                    CapValue::from_item_bytes(item_type, one.item.to_le_bytes())
                });
            }
        }
        rc
    }

    fn user_interface(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        ui: &UserInterface,
    ) -> ReturnCode {
        let mut raw = TwUserInterface {
            show_ui: ui.show_ui as u16,
            modal_ui: ui.modal_ui as u16,
            parent: ui.parent.0 as *mut c_void,
        };
        self.call_source(app, source, DG_CONTROL, DAT_USERINTERFACE, msg, &mut raw)
    }

    fn process_event(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        event: &RawEvent,
    ) -> EventOutcome {
        let mut message = MSG {
            hwnd: event.window.0 as *mut c_void,
            message: event.message,
            wParam: event.wparam,
            lParam: event.lparam,
            time: event.time,
            pt: POINT {
                x: event.x as i32,
                y: event.y as i32,
            },
        };
        let mut raw = TwEvent {
            event: &mut message as *mut MSG as *mut c_void,
            message: MSG_NULL,
        };
        let code = self.call_source(app, source, DG_CONTROL, DAT_EVENT, Msg::ProcessEvent, &mut raw);
        EventOutcome {
            code,
            message: Msg::from_raw(raw.message),
        }
    }

    fn image_info(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        info: &mut ImageInfo,
    ) -> ReturnCode {
        let mut raw = TwImageInfo::default();
        let rc = self.call_source(app, source, DG_IMAGE, DAT_IMAGEINFO, Msg::Get, &mut raw);
        if rc.is_success() {
            *info = ImageInfo {
                x_resolution: raw.x_resolution.into(),
                y_resolution: raw.y_resolution.into(),
                image_width: raw.image_width,
                image_length: raw.image_length,
                samples_per_pixel: raw.samples_per_pixel,
                bits_per_sample: raw.bits_per_sample,
                bits_per_pixel: raw.bits_per_pixel,
                planar: raw.planar != 0,
                pixel_type: PixelType::from_raw(raw.pixel_type as u16),
                compression: raw.compression,
            };
        }
        rc
    }

    fn image_layout(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        layout: &mut ImageLayout,
    ) -> ReturnCode {
        let mut raw = TwImageLayout {
            frame: (&layout.frame).into(),
            document_number: layout.document_number,
            page_number: layout.page_number,
            frame_number: layout.frame_number,
        };
        let rc = self.call_source(app, source, DG_IMAGE, DAT_IMAGELAYOUT, msg, &mut raw);
        if rc.is_success() {
            *layout = ImageLayout {
                frame: raw.frame.into(),
                document_number: raw.document_number,
                page_number: raw.page_number,
                frame_number: raw.frame_number,
            };
        }
        rc
    }

    fn pending_xfers(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        pending: &mut PendingXfers,
    ) -> ReturnCode {
        let mut raw = TwPendingXfers::default();
        let rc = self.call_source(app, source, DG_CONTROL, DAT_PENDINGXFERS, msg, &mut raw);
        if rc.is_success() {
            *pending = PendingXfers {
                count: raw.count,
                end_of_job: raw.eoj,
            };
        }
        rc
    }

    fn setup_mem_xfer(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        setup: &mut SetupMemXfer,
    ) -> ReturnCode {
        let mut raw = TwSetupMemXfer::default();
        let rc = self.call_source(app, source, DG_CONTROL, DAT_SETUPMEMXFER, Msg::Get, &mut raw);
        if rc.is_success() {
            *setup = SetupMemXfer {
                min_buf_size: raw.min_buf_size,
                max_buf_size: raw.max_buf_size,
                preferred: raw.preferred,
            };
        }
        rc
    }

    fn image_mem_xfer(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        chunk: &mut MemXferChunk,
        buffer: &mut [u8],
    ) -> ReturnCode {
        let mut raw = TwImageMemXfer {
            compression: TWON_DONTCARE16,
            bytes_per_row: TWON_DONTCARE32,
            columns: TWON_DONTCARE32,
            rows: TWON_DONTCARE32,
            x_offset: TWON_DONTCARE32,
            y_offset: TWON_DONTCARE32,
            bytes_written: TWON_DONTCARE32,
            memory: TwMemory {
                flags: TWMF_APPOWNS | TWMF_POINTER,
                length: buffer.len() as u32,
                the_mem: buffer.as_mut_ptr() as *mut c_void,
            },
        };
        let rc = self.call_source(app, source, DG_IMAGE, DAT_IMAGEMEMXFER, Msg::Get, &mut raw);
        if matches!(rc, ReturnCode::Success | ReturnCode::XferDone) {
            *chunk = MemXferChunk {
                compression: raw.compression,
                bytes_per_row: raw.bytes_per_row,
                columns: raw.columns,
                rows: raw.rows,
                x_offset: raw.x_offset,
                y_offset: raw.y_offset,
                bytes_written: raw.bytes_written,
            };
        }
        rc
    }

    fn image_native_xfer(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        image: &mut Option<Box<dyn NativeImage>>,
    ) -> ReturnCode {
        let mut handle: HGLOBAL = ptr::null_mut();
        let rc = self.call_source(app, source, DG_IMAGE, DAT_IMAGENATIVEXFER, Msg::Get, &mut handle);
        if rc == ReturnCode::XferDone {
            *image = NativeDib::lock(handle).map(|dib| Box::new(dib) as Box<dyn NativeImage>);
        } else if let Some(stray) = GlobalBlock::from_raw(handle) {
            drop(stray);
        }
        rc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_layout_is_packed() {
        assert_eq!(std::mem::size_of::<TwVersion>(), 42);
        assert_eq!(std::mem::size_of::<TwIdentity>(), 156);
        assert_eq!(std::mem::size_of::<TwOneValue>(), 6);
        assert_eq!(std::mem::size_of::<TwPendingXfers>(), 6);
    }

    #[test]
    fn test_str32_truncates() {
        let long = "x".repeat(40);
        let raw = to_str32(&long);
        assert_eq!(from_str32(&raw).len(), 32);
        assert_eq!(from_str32(&to_str32("Scanner")), "Scanner");
    }
}
