//! Source manager boundary abstraction.
//!
//! Defines the `DsmTransport` trait: one typed entry per (data group,
//! argument type) pair the engine uses, allowing different implementations
//! (the platform source manager, the scripted mock, etc.).

use crate::protocol::{
    ApplicationIdentity, CapabilityData, EventOutcome, ImageInfo, ImageLayout, MemXferChunk, Msg,
    PendingXfers, RawEvent, ReturnCode, SetupMemXfer, SourceIdentity, Status, UserInterface,
    WindowHandle,
};

/// Device- or OS-owned image handed back by a native transfer.
///
/// Dropping the value releases the underlying buffer.
pub trait NativeImage {
    /// Raw bytes of the transferred image (a packed device-independent bitmap).
    fn bytes(&self) -> &[u8];
}

/// Abstract source manager interface.
///
/// Every method is a single synchronous round-trip; the returned code is
/// passed through untouched so callers decide what counts as failure.
pub trait DsmTransport {
    /// `DG_CONTROL / DAT_PARENT / MSG_OPENDSM | MSG_CLOSEDSM`.
    ///
    /// On open the manager assigns `app.id`.
    fn parent(&self, app: &mut ApplicationIdentity, msg: Msg, window: WindowHandle) -> ReturnCode;

    /// `DG_CONTROL / DAT_IDENTITY`: open/close a source, get the default,
    /// enumerate with first/next, or run the interactive chooser.
    fn identity(
        &self,
        app: &ApplicationIdentity,
        msg: Msg,
        source: &mut SourceIdentity,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_STATUS / MSG_GET`, against the manager when
    /// `source` is `None`.
    fn status(&self, app: &ApplicationIdentity, source: Option<&SourceIdentity>) -> Status;

    /// `DG_CONTROL / DAT_CAPABILITY`.
    fn capability(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        cap: &mut CapabilityData,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_USERINTERFACE / MSG_ENABLEDS | MSG_DISABLEDS`.
    fn user_interface(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        ui: &UserInterface,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_EVENT / MSG_PROCESSEVENT`.
    fn process_event(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        event: &RawEvent,
    ) -> EventOutcome;

    /// `DG_IMAGE / DAT_IMAGEINFO / MSG_GET`.
    fn image_info(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        info: &mut ImageInfo,
    ) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGELAYOUT`.
    fn image_layout(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        layout: &mut ImageLayout,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_PENDINGXFERS / MSG_ENDXFER | MSG_RESET`.
    fn pending_xfers(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        msg: Msg,
        pending: &mut PendingXfers,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_SETUPMEMXFER / MSG_GET`.
    fn setup_mem_xfer(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        setup: &mut SetupMemXfer,
    ) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGEMEMXFER / MSG_GET`: fill `buffer` with the next
    /// chunk. Blocks until the device answers.
    fn image_mem_xfer(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        chunk: &mut MemXferChunk,
        buffer: &mut [u8],
    ) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGENATIVEXFER / MSG_GET`: retrieve one whole image.
    /// Blocks until the device answers.
    fn image_native_xfer(
        &self,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        image: &mut Option<Box<dyn NativeImage>>,
    ) -> ReturnCode;
}
