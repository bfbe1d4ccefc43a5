//! Scripted source manager for testing and simulation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use byteorder::{LittleEndian, WriteBytesExt};

use super::traits::{DsmTransport, NativeImage};
use crate::protocol::constants::*;
use crate::protocol::{
    ApplicationIdentity, CapValue, CapabilityData, ConditionCode, EventOutcome, Fix32, ImageInfo,
    ImageLayout, MemXferChunk, Msg, PendingXfers, PixelType, RawEvent, ReturnCode, SetupMemXfer,
    SourceIdentity, Status, UserInterface, WindowHandle,
};

/// One recorded protocol call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsmCall {
    pub dg: u32,
    pub dat: u16,
    pub msg: Msg,
    /// Capability code for `DAT_CAPABILITY` calls.
    pub cap: Option<u16>,
}

/// Image scripted into the mock device.
#[derive(Debug, Clone)]
pub struct MockImage {
    pub info: ImageInfo,
    /// Bytes per row as the device reports them (no alignment padding).
    pub bytes_per_row: u32,
    /// Top-down pixel rows, `bytes_per_row * image_length` bytes.
    pub rows: Vec<u8>,
}

impl MockImage {
    /// Deterministic test pattern of the given size and pixel type.
    pub fn pattern(width: u32, length: u32, pixel_type: PixelType) -> Self {
        let bits_per_pixel: i16 = match pixel_type {
            PixelType::BlackAndWhite => 1,
            PixelType::Rgb => 24,
            _ => 8,
        };
        let bytes_per_row = (width * bits_per_pixel as u32).div_ceil(8);
        let rows = (0..length)
            .flat_map(|y| (0..bytes_per_row).map(move |x| (x + y * 7) as u8))
            .collect();
        let samples: usize = if pixel_type == PixelType::Rgb { 3 } else { 1 };
        let mut bits_per_sample = [0i16; 8];
        for slot in bits_per_sample.iter_mut().take(samples) {
            *slot = bits_per_pixel / samples as i16;
        }
        Self {
            info: ImageInfo {
                x_resolution: Fix32::new(300, 0),
                y_resolution: Fix32::new(300, 0),
                image_width: width as i32,
                image_length: length as i32,
                samples_per_pixel: samples as i16,
                bits_per_sample,
                bits_per_pixel,
                planar: false,
                pixel_type,
                compression: TWCP_NONE,
            },
            bytes_per_row,
            rows,
        }
    }

    fn length(&self) -> u32 {
        self.info.image_length.max(0) as u32
    }

    /// Packed bottom-up device-independent bitmap of the pattern, the form a
    /// native transfer hands back.
    pub fn to_dib(&self) -> Vec<u8> {
        let bpp = self.info.bits_per_pixel as u16;
        let width = self.info.image_width;
        let length = self.length();
        let stride = ((width as u32 * bpp as u32).div_ceil(32) * 4) as usize;
        let palette = if bpp <= 8 { 1u32 << bpp } else { 0 };

        let mut dib = Vec::with_capacity(40 + palette as usize * 4 + stride * length as usize);
        // Writes into a Vec cannot fail.
        let _ = (|| -> std::io::Result<()> {
            dib.write_u32::<LittleEndian>(40)?;
            dib.write_i32::<LittleEndian>(width)?;
            dib.write_i32::<LittleEndian>(length as i32)?;
            dib.write_u16::<LittleEndian>(1)?;
            dib.write_u16::<LittleEndian>(bpp)?;
            dib.write_u32::<LittleEndian>(0)?;
            dib.write_u32::<LittleEndian>((stride * length as usize) as u32)?;
            dib.write_i32::<LittleEndian>(11811)?;
            dib.write_i32::<LittleEndian>(11811)?;
            dib.write_u32::<LittleEndian>(palette)?;
            dib.write_u32::<LittleEndian>(0)?;
            Ok(())
        })();
        for i in 0..palette {
            let level = (i * 255 / (palette - 1).max(1)) as u8;
            dib.extend_from_slice(&[level, level, level, 0]);
        }
        let bpr = self.bytes_per_row as usize;
        for y in (0..length as usize).rev() {
            let start = dib.len();
            dib.extend_from_slice(&self.rows[y * bpr..(y + 1) * bpr]);
            dib.resize(start + stride, 0);
        }
        dib
    }
}

/// Injected failure for the `nth` call (1-based) of a (DAT, MSG) pair.
#[derive(Debug, Clone, Copy)]
struct Fault {
    dat: u16,
    msg: Msg,
    nth: usize,
    code: ReturnCode,
    condition: ConditionCode,
}

#[derive(Debug)]
struct ActiveImage {
    image: MockImage,
    next_row: u32,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<DsmCall>,
    open_dsm_result: ReturnCode,
    sources: Vec<SourceIdentity>,
    default_source: Option<usize>,
    user_choice: Option<usize>,
    cursor: usize,
    enumeration_fault: Option<(usize, ReturnCode)>,
    open_result: ReturnCode,
    enable_result: ReturnCode,
    reject_all_sets: bool,
    rejected_caps: HashSet<u16>,
    unsupported_caps: HashSet<u16>,
    cap_values: HashMap<u16, CapValue>,
    condition: ConditionCode,
    layout_result: ReturnCode,
    layout: ImageLayout,
    events: VecDeque<Msg>,
    pending_counts: VecDeque<u16>,
    images: VecDeque<MockImage>,
    active: Option<ActiveImage>,
    setup: SetupMemXfer,
    max_chunk_rows: Option<u32>,
    faults: Vec<Fault>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            open_dsm_result: ReturnCode::Success,
            sources: Vec::new(),
            default_source: None,
            user_choice: None,
            cursor: 0,
            enumeration_fault: None,
            open_result: ReturnCode::Success,
            enable_result: ReturnCode::Success,
            reject_all_sets: false,
            rejected_caps: HashSet::new(),
            unsupported_caps: HashSet::new(),
            cap_values: HashMap::new(),
            condition: ConditionCode::Success,
            layout_result: ReturnCode::Success,
            layout: ImageLayout::default(),
            events: VecDeque::new(),
            pending_counts: VecDeque::new(),
            images: VecDeque::new(),
            active: None,
            setup: SetupMemXfer {
                min_buf_size: 4096,
                max_buf_size: 1 << 20,
                preferred: 1 << 20,
            },
            max_chunk_rows: None,
            faults: Vec::new(),
        }
    }
}

impl MockState {
    fn record(&mut self, dg: u32, dat: u16, msg: Msg, cap: Option<u16>) -> Option<ReturnCode> {
        self.calls.push(DsmCall { dg, dat, msg, cap });
        let seen = self
            .calls
            .iter()
            .filter(|c| c.dat == dat && c.msg == msg)
            .count();
        let fault = self
            .faults
            .iter()
            .find(|f| f.dat == dat && f.msg == msg && f.nth == seen)
            .copied()?;
        self.condition = fault.condition;
        Some(fault.code)
    }

    fn fail(&mut self, condition: ConditionCode) -> ReturnCode {
        self.condition = condition;
        ReturnCode::Failure
    }

    fn ensure_active(&mut self) -> bool {
        if self.active.is_none() {
            if let Some(image) = self.images.pop_front() {
                self.active = Some(ActiveImage { image, next_row: 0 });
            }
        }
        self.active.is_some()
    }
}

/// Mock source manager for unit testing engine logic.
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to script the device and inspect the call log.
#[derive(Debug, Clone, Default)]
pub struct MockDsm {
    state: Arc<Mutex<MockState>>,
    released: Arc<AtomicUsize>,
}

impl MockDsm {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the call log from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Add a source; the first one added becomes the default.
    pub fn add_source(&self, product_name: &str) -> SourceIdentity {
        let mut state = self.lock();
        let source = SourceIdentity {
            id: state.sources.len() as u32 + 100,
            manufacturer: "Mock".into(),
            product_family: "Mock Scanners".into(),
            ..SourceIdentity::named(product_name)
        };
        state.sources.push(source.clone());
        if state.default_source.is_none() {
            state.default_source = Some(state.sources.len() - 1);
        }
        source
    }

    /// Remove the default, so `MSG_GETDEFAULT` fails.
    pub fn clear_default(&self) {
        self.lock().default_source = None;
    }

    /// Source picked by the interactive chooser; `None` means the user cancels.
    pub fn set_user_choice(&self, index: Option<usize>) {
        self.lock().user_choice = index;
    }

    /// Make the `index`-th enumeration call (0 = get-first) return `code`.
    pub fn fail_enumeration_at(&self, index: usize, code: ReturnCode) {
        self.lock().enumeration_fault = Some((index, code));
    }

    pub fn set_open_dsm_result(&self, code: ReturnCode) {
        self.lock().open_dsm_result = code;
    }

    pub fn set_open_result(&self, code: ReturnCode) {
        self.lock().open_result = code;
    }

    pub fn set_enable_result(&self, code: ReturnCode) {
        self.lock().enable_result = code;
    }

    /// Reject every capability set.
    pub fn reject_all_sets(&self) {
        self.lock().reject_all_sets = true;
    }

    /// Reject sets of one capability with `TWCC_BADVALUE`.
    pub fn reject_cap(&self, cap: u16) {
        self.lock().rejected_caps.insert(cap);
    }

    /// Answer every call for `cap` with `TWCC_CAPUNSUPPORTED`.
    pub fn unsupport_cap(&self, cap: u16) {
        self.lock().unsupported_caps.insert(cap);
    }

    /// Current value returned by get calls.
    pub fn set_cap(&self, cap: u16, value: CapValue) {
        self.lock().cap_values.insert(cap, value);
    }

    pub fn cap_value(&self, cap: u16) -> Option<CapValue> {
        self.lock().cap_values.get(&cap).copied()
    }

    pub fn set_layout_result(&self, code: ReturnCode) {
        self.lock().layout_result = code;
    }

    pub fn layout(&self) -> ImageLayout {
        self.lock().layout
    }

    /// Queue a message delivered by the next forwarded event.
    pub fn queue_event(&self, msg: Msg) {
        self.lock().events.push_back(msg);
    }

    /// Queue the count reported by successive end-of-transfer calls.
    pub fn queue_pending_counts(&self, counts: &[u16]) {
        self.lock().pending_counts.extend(counts.iter().copied());
    }

    pub fn queue_image(&self, image: MockImage) {
        self.lock().images.push_back(image);
    }

    pub fn set_buffer_sizes(&self, min: u32, max: u32, preferred: u32) {
        self.lock().setup = SetupMemXfer {
            min_buf_size: min,
            max_buf_size: max,
            preferred,
        };
    }

    /// Limit how many rows a single memory-transfer chunk carries.
    pub fn set_max_chunk_rows(&self, rows: u32) {
        self.lock().max_chunk_rows = Some(rows);
    }

    /// Make the `nth` (1-based) call of `dat`/`msg` return `code`.
    pub fn fail_call(&self, dat: u16, msg: Msg, nth: usize, code: ReturnCode) {
        self.lock().faults.push(Fault {
            dat,
            msg,
            nth,
            code,
            condition: ConditionCode::OperationError,
        });
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn calls(&self) -> Vec<DsmCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of recorded calls for a (DAT, MSG) pair.
    pub fn count(&self, dat: u16, msg: Msg) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.dat == dat && c.msg == msg)
            .count()
    }

    /// Capability codes of every call with `msg`, in call order.
    pub fn cap_calls(&self, msg: Msg) -> Vec<u16> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.dat == DAT_CAPABILITY && c.msg == msg)
            .filter_map(|c| c.cap)
            .collect()
    }

    /// Native image buffers released so far.
    pub fn released_images(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct MockNativeImage {
    bytes: Vec<u8>,
    released: Arc<AtomicUsize>,
}

impl NativeImage for MockNativeImage {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for MockNativeImage {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl DsmTransport for MockDsm {
    fn parent(&self, app: &mut ApplicationIdentity, msg: Msg, _window: WindowHandle) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_PARENT, msg, None) {
            return code;
        }
        match msg {
            Msg::OpenDsm => {
                let code = state.open_dsm_result;
                if code.is_success() {
                    app.id = 1;
                }
                code
            }
            Msg::CloseDsm => ReturnCode::Success,
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn identity(
        &self,
        _app: &ApplicationIdentity,
        msg: Msg,
        source: &mut SourceIdentity,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_IDENTITY, msg, None) {
            return code;
        }
        match msg {
            Msg::GetDefault => match state.default_source.filter(|&i| i < state.sources.len()) {
                Some(i) => {
                    *source = state.sources[i].clone();
                    ReturnCode::Success
                }
                None => state.fail(ConditionCode::NoDs),
            },
            Msg::GetFirst | Msg::GetNext => {
                if msg == Msg::GetFirst {
                    state.cursor = 0;
                }
                let index = state.cursor;
                if let Some((at, code)) = state.enumeration_fault {
                    if at == index {
                        state.condition = ConditionCode::Bummer;
                        return code;
                    }
                }
                match state.sources.get(index).cloned() {
                    Some(found) => {
                        *source = found;
                        state.cursor += 1;
                        ReturnCode::Success
                    }
                    None => ReturnCode::EndOfList,
                }
            }
            Msg::UserSelect => match state.user_choice.and_then(|i| state.sources.get(i)) {
                Some(found) => {
                    *source = found.clone();
                    ReturnCode::Success
                }
                None => ReturnCode::Cancel,
            },
            Msg::OpenDs => {
                let code = state.open_result;
                if !code.is_success() {
                    state.condition = ConditionCode::NoDs;
                }
                code
            }
            Msg::CloseDs => {
                state.active = None;
                ReturnCode::Success
            }
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn status(&self, _app: &ApplicationIdentity, _source: Option<&SourceIdentity>) -> Status {
        let mut state = self.lock();
        state.calls.push(DsmCall {
            dg: DG_CONTROL,
            dat: DAT_STATUS,
            msg: Msg::Get,
            cap: None,
        });
        let condition = std::mem::take(&mut state.condition);
        Status {
            condition_code: condition,
            data: 0,
        }
    }

    fn capability(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        msg: Msg,
        cap: &mut CapabilityData,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_CAPABILITY, msg, Some(cap.cap)) {
            return code;
        }
        if state.unsupported_caps.contains(&cap.cap) {
            return state.fail(ConditionCode::CapUnsupported);
        }
        match msg {
            Msg::Set => {
                if state.reject_all_sets || state.rejected_caps.contains(&cap.cap) {
                    return state.fail(ConditionCode::BadValue);
                }
                match cap.value {
                    Some(value) => {
                        state.cap_values.insert(cap.cap, value);
                        ReturnCode::Success
                    }
                    None => state.fail(ConditionCode::BadValue),
                }
            }
            Msg::Get | Msg::GetCurrent | Msg::GetDefault => {
                match state.cap_values.get(&cap.cap).copied() {
                    Some(value) => {
                        cap.value = Some(value);
                        ReturnCode::Success
                    }
                    None => state.fail(ConditionCode::CapUnsupported),
                }
            }
            _ => state.fail(ConditionCode::CapBadOperation),
        }
    }

    fn user_interface(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        msg: Msg,
        _ui: &UserInterface,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_USERINTERFACE, msg, None) {
            return code;
        }
        match msg {
            Msg::EnableDs => {
                let code = state.enable_result;
                if !code.is_success() {
                    state.condition = ConditionCode::OperationError;
                }
                code
            }
            Msg::DisableDs => ReturnCode::Success,
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn process_event(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        _event: &RawEvent,
    ) -> EventOutcome {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_EVENT, Msg::ProcessEvent, None) {
            return EventOutcome {
                code,
                message: Msg::Null,
            };
        }
        match state.events.pop_front() {
            Some(message) => EventOutcome {
                code: ReturnCode::DsEvent,
                message,
            },
            None => EventOutcome {
                code: ReturnCode::NotDsEvent,
                message: Msg::Null,
            },
        }
    }

    fn image_info(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        info: &mut ImageInfo,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_IMAGE, DAT_IMAGEINFO, Msg::Get, None) {
            return code;
        }
        if !state.ensure_active() {
            return state.fail(ConditionCode::SeqError);
        }
        if let Some(active) = &state.active {
            *info = active.image.info.clone();
        }
        ReturnCode::Success
    }

    fn image_layout(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        msg: Msg,
        layout: &mut ImageLayout,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_IMAGE, DAT_IMAGELAYOUT, msg, None) {
            return code;
        }
        match msg {
            Msg::Set => {
                let code = state.layout_result;
                if code.is_success() {
                    state.layout = *layout;
                } else {
                    state.condition = ConditionCode::BadValue;
                }
                code
            }
            _ => {
                *layout = state.layout;
                ReturnCode::Success
            }
        }
    }

    fn pending_xfers(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        msg: Msg,
        pending: &mut PendingXfers,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_PENDINGXFERS, msg, None) {
            return code;
        }
        match msg {
            Msg::EndXfer => {
                state.active = None;
                pending.count = state.pending_counts.pop_front().unwrap_or(0);
                ReturnCode::Success
            }
            Msg::Reset => {
                state.active = None;
                state.images.clear();
                state.pending_counts.clear();
                pending.count = 0;
                ReturnCode::Success
            }
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn setup_mem_xfer(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        setup: &mut SetupMemXfer,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_CONTROL, DAT_SETUPMEMXFER, Msg::Get, None) {
            return code;
        }
        *setup = state.setup;
        ReturnCode::Success
    }

    fn image_mem_xfer(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        chunk: &mut MemXferChunk,
        buffer: &mut [u8],
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_IMAGE, DAT_IMAGEMEMXFER, Msg::Get, None) {
            return code;
        }
        if !state.ensure_active() {
            return state.fail(ConditionCode::SeqError);
        }
        let max_chunk_rows = state.max_chunk_rows;
        let (bpr, remaining) = match state.active.as_ref() {
            Some(active) => (
                active.image.bytes_per_row,
                active.image.length().saturating_sub(active.next_row),
            ),
            None => return ReturnCode::Failure,
        };
        let fits = if bpr == 0 { 0 } else { buffer.len() as u32 / bpr };
        let rows = remaining.min(fits).min(max_chunk_rows.unwrap_or(u32::MAX));
        if rows == 0 && remaining > 0 {
            return state.fail(ConditionCode::LowMemory);
        }
        let Some(active) = state.active.as_mut() else {
            return ReturnCode::Failure;
        };

        let start = (active.next_row * bpr) as usize;
        let len = (rows * bpr) as usize;
        buffer[..len].copy_from_slice(&active.image.rows[start..start + len]);
        *chunk = MemXferChunk {
            compression: TWCP_NONE,
            bytes_per_row: bpr,
            columns: active.image.info.image_width as u32,
            rows,
            x_offset: 0,
            y_offset: active.next_row,
            bytes_written: len as u32,
        };
        active.next_row += rows;

        if active.next_row >= active.image.length() {
            ReturnCode::XferDone
        } else {
            ReturnCode::Success
        }
    }

    fn image_native_xfer(
        &self,
        _app: &ApplicationIdentity,
        _source: &SourceIdentity,
        image: &mut Option<Box<dyn NativeImage>>,
    ) -> ReturnCode {
        let mut state = self.lock();
        if let Some(code) = state.record(DG_IMAGE, DAT_IMAGENATIVEXFER, Msg::Get, None) {
            return code;
        }
        if !state.ensure_active() {
            return state.fail(ConditionCode::SeqError);
        }
        let Some(active) = state.active.as_ref() else {
            return ReturnCode::Failure;
        };
        *image = Some(Box::new(MockNativeImage {
            bytes: active.image.to_dib(),
            released: Arc::clone(&self.released),
        }));
        ReturnCode::XferDone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> ApplicationIdentity {
        ApplicationIdentity::new("Test", "Test", "Test", Default::default())
    }

    #[test]
    fn test_mock_enumeration() {
        let mock = MockDsm::new();
        mock.add_source("Alpha");
        mock.add_source("Beta");

        let mut id = SourceIdentity::default();
        assert_eq!(mock.identity(&app(), Msg::GetFirst, &mut id), ReturnCode::Success);
        assert_eq!(id.product_name, "Alpha");
        assert_eq!(mock.identity(&app(), Msg::GetNext, &mut id), ReturnCode::Success);
        assert_eq!(id.product_name, "Beta");
        assert_eq!(mock.identity(&app(), Msg::GetNext, &mut id), ReturnCode::EndOfList);
    }

    #[test]
    fn test_mock_call_log_and_faults() {
        let mock = MockDsm::new();
        let source = mock.add_source("Alpha");
        mock.fail_call(DAT_PENDINGXFERS, Msg::EndXfer, 2, ReturnCode::Failure);

        let mut pending = PendingXfers::default();
        let first = mock.pending_xfers(&app(), &source, Msg::EndXfer, &mut pending);
        let second = mock.pending_xfers(&app(), &source, Msg::EndXfer, &mut pending);
        assert_eq!(first, ReturnCode::Success);
        assert_eq!(second, ReturnCode::Failure);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::EndXfer), 2);
        assert_eq!(
            mock.status(&app(), Some(&source)).condition_code,
            ConditionCode::OperationError
        );
    }

    #[test]
    fn test_mock_native_release_on_drop() {
        let mock = MockDsm::new();
        let source = mock.add_source("Alpha");
        mock.queue_image(MockImage::pattern(4, 2, PixelType::Grey));

        let mut image = None;
        let code = mock.image_native_xfer(&app(), &source, &mut image);
        assert_eq!(code, ReturnCode::XferDone);
        assert_eq!(mock.released_images(), 0);
        drop(image);
        assert_eq!(mock.released_images(), 1);
    }

    #[test]
    fn test_mock_chunks_respect_buffer() {
        let mock = MockDsm::new();
        let source = mock.add_source("Alpha");
        mock.queue_image(MockImage::pattern(10, 5, PixelType::Grey));

        let mut buffer = vec![0u8; 20];
        let mut chunk = MemXferChunk::default();
        let code = mock.image_mem_xfer(&app(), &source, &mut chunk, &mut buffer);
        assert_eq!(code, ReturnCode::Success);
        assert_eq!(chunk.rows, 2);
        assert_eq!(chunk.bytes_written, 20);

        mock.image_mem_xfer(&app(), &source, &mut chunk, &mut buffer);
        let code = mock.image_mem_xfer(&app(), &source, &mut chunk, &mut buffer);
        assert_eq!(code, ReturnCode::XferDone);
        assert_eq!(chunk.rows, 1);
        assert_eq!(chunk.y_offset, 4);
    }
}
