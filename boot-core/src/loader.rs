// SPDX-License-Identifier: MIT

//! The upgrade state machine and its cooperative driver.
//!
//! A [`Loader`] is stepped by calling [`handle`](Loader::handle) from the
//! board's main loop. Each step drains the receive path into the frame
//! parser, dispatches at most the frames that completed, and runs the
//! per-state time budgets. Every transition into IDLE out of a destructive
//! sequence erases the resident header first, so a half-written image can
//! never pass post-validation later.

use boot_protocol::frame::{FeedResult, FrameParser};
use boot_protocol::{dispatch, encode, Command, MessageHandler, Source, Status, DATA_PAYLOAD_SIZE};

use crate::config::Config;
use crate::handoff::{BootReason, Handoff};
use crate::image::{self, ImageHeader, HEADER_SIZE};
use crate::platform::{IoError, Platform};
use crate::{EcdsaVerify, Sha256};

/// Upgrade FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Waiting for a manager; may leave into a valid resident image.
    Idle,
    /// Connected, waiting for the image header.
    Prepare,
    /// Receiving and writing payload chunks.
    Flash,
    /// All bytes written, waiting for the exit request.
    Exit,
}

/// Progress of one upgrade, reset on every IDLE entry.
#[derive(Debug, Clone, Copy, Default)]
struct FlashCtx {
    working_addr: u32,
    flashed_bytes: u32,
    image_size: u32,
}

/// The bootloader core.
pub struct Loader<'a, P: Platform, S: Sha256, V: EcdsaVerify> {
    platform: P,
    sha: S,
    ecdsa: V,
    config: Config,
    handoff: Handoff<'a>,
    parser: FrameParser,
    state: State,
    state_entered_ms: u32,
    last_rx_ms: u32,
    idle_probe_armed: bool,
    startup_window_ms: Option<u32>,
    flash_ctx: FlashCtx,
    scratch: [u8; DATA_PAYLOAD_SIZE],
}

impl<'a, P: Platform, S: Sha256, V: EcdsaVerify> Loader<'a, P, S, V> {
    pub fn new(platform: P, sha: S, ecdsa: V, handoff: Handoff<'a>, config: Config) -> Self {
        Loader {
            platform,
            sha,
            ecdsa,
            config,
            handoff,
            parser: FrameParser::new(),
            state: State::Idle,
            state_entered_ms: 0,
            last_rx_ms: 0,
            idle_probe_armed: false,
            startup_window_ms: None,
            flash_ctx: FlashCtx::default(),
            scratch: [0; DATA_PAYLOAD_SIZE],
        }
    }

    /// Reset-time entry: refresh the handoff region, trip the boot counter,
    /// and open the back-door window when the resident image checks out.
    ///
    /// Call once, then step [`handle`](Loader::handle) forever.
    pub fn start(&mut self) {
        let now = self.platform.now_ms();

        self.handoff.init(self.config.boot_version);
        if let Some(limit) = self.config.boot_count_limit {
            if self.handoff.boot_count() >= limit {
                // The application keeps resetting without reporting in;
                // stop jumping back into it and wait for the manager.
                self.handoff.set_boot_reason(BootReason::Com);
                let _ = self.make_ctx(now).erase_resident_header();
            }
        }

        if self.handoff.boot_reason() == BootReason::None {
            let status = image::post_validate(
                &mut self.platform,
                &mut self.sha,
                &self.ecdsa,
                &self.config,
            );
            if status.is_ok() {
                self.startup_window_ms = Some(now);
            }
        }

        self.make_ctx(now).enter_idle();
    }

    /// One cooperative step; run from the main loop.
    pub fn handle(&mut self) {
        let now = self.platform.now_ms();

        while let Some(byte) = self.platform.rx_byte() {
            self.last_rx_ms = now;
            match self.parser.feed(byte, now) {
                FeedResult::Pending => {}
                // Not a valid message; nothing to answer.
                FeedResult::CrcError => {}
                FeedResult::Overflow => self.platform.clear_rx(),
                FeedResult::Complete => self.dispatch_frame(now),
            }
        }

        self.parser
            .check_timeout(now, self.config.parser_idle_timeout_ms);

        let last_rx = self.last_rx_ms;
        self.make_ctx(now).poll(last_rx);
        self.poll_startup(now);
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The board side of the loader, e.g. for pushing received bytes.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn dispatch_frame(&mut self, now: u32) {
        let Loader {
            platform,
            sha,
            ecdsa,
            config,
            handoff,
            parser,
            state,
            state_entered_ms,
            idle_probe_armed,
            flash_ctx,
            scratch,
            ..
        } = self;
        let frame = parser.frame();
        // Traffic of our own role (symmetric manager builds): parsed and
        // accepted, but it never drives the FSM.
        if frame.source == Source::Loader as u8 {
            return;
        }
        let mut handler = Fsm {
            platform,
            sha,
            ecdsa: &*ecdsa,
            config,
            handoff,
            state,
            state_entered_ms,
            idle_probe_armed,
            flash_ctx,
            scratch,
            now,
        };
        let _ = dispatch(&frame, &mut handler);
    }

    fn poll_startup(&mut self, now: u32) {
        let Some(started) = self.startup_window_ms else {
            return;
        };
        if now.wrapping_sub(started) < self.config.wait_at_startup_ms {
            return;
        }
        self.startup_window_ms = None;
        // Re-check: a CONNECT during the window claims the loader.
        if self.handoff.boot_reason() == BootReason::None && self.state == State::Idle {
            let _ = self.platform.deinit_for_jump();
            self.platform.jump_to(self.config.app_start_addr);
        }
    }

    fn make_ctx(&mut self, now: u32) -> Fsm<'_, 'a, P, S, V> {
        let Loader {
            platform,
            sha,
            ecdsa,
            config,
            handoff,
            state,
            state_entered_ms,
            idle_probe_armed,
            flash_ctx,
            scratch,
            ..
        } = self;
        Fsm {
            platform,
            sha,
            ecdsa: &*ecdsa,
            config,
            handoff,
            state,
            state_entered_ms,
            idle_probe_armed,
            flash_ctx,
            scratch,
            now,
        }
    }
}

/// One borrow of everything a message handler may touch. The frame parser
/// stays outside so a dispatched frame can keep borrowing its buffer.
struct Fsm<'b, 'a, P: Platform, S: Sha256, V: EcdsaVerify> {
    platform: &'b mut P,
    sha: &'b mut S,
    ecdsa: &'b V,
    config: &'b Config,
    handoff: &'b mut Handoff<'a>,
    state: &'b mut State,
    state_entered_ms: &'b mut u32,
    idle_probe_armed: &'b mut bool,
    flash_ctx: &'b mut FlashCtx,
    scratch: &'b mut [u8; DATA_PAYLOAD_SIZE],
    now: u32,
}

impl<P: Platform, S: Sha256, V: EcdsaVerify> Fsm<'_, '_, P, S, V> {
    fn respond_with(&mut self, command: Command, status: Status, payload: &[u8]) {
        let mut buf = [0u8; 16];
        if let Ok(n) = encode(Source::Loader, command, status, payload, &mut buf) {
            let _ = self.platform.tx_all(&buf[..n]);
        }
    }

    fn respond(&mut self, command: Command, status: Status) {
        self.respond_with(command, status, &[]);
    }

    fn go(&mut self, state: State) {
        *self.state = state;
        *self.state_entered_ms = self.now;
    }

    fn enter_idle(&mut self) {
        *self.flash_ctx = FlashCtx::default();
        self.platform.decrypt_reset();
        *self.idle_probe_armed = true;
        self.go(State::Idle);
    }

    fn erase_resident_header(&mut self) -> Result<(), IoError> {
        let result = self
            .platform
            .flash_erase(self.config.app_head_addr, self.config.page_size);
        self.platform.kick_watchdog();
        result
    }

    fn erase_region(&mut self, addr: u32, len: u32) -> Result<(), IoError> {
        let end = addr.checked_add(len).ok_or(IoError)?;
        let page = self.config.page_size;
        let mut at = addr;
        while at < end {
            self.platform.flash_erase(at, page)?;
            self.platform.kick_watchdog();
            at = at.saturating_add(page);
        }
        Ok(())
    }

    fn write_header(&mut self, addr: u32, bytes: &[u8; HEADER_SIZE]) -> Result<(), IoError> {
        self.platform.flash_write(addr, bytes)?;
        let mut readback = [0u8; HEADER_SIZE];
        self.platform.flash_read(addr, &mut readback)?;
        if readback != *bytes {
            return Err(IoError);
        }
        Ok(())
    }

    /// Per-state time budgets. Timing out of any upgrade state destroys the
    /// resident header: the peer is gone and the image state is unknown.
    fn poll(&mut self, last_rx_ms: u32) {
        match *self.state {
            State::Idle => {
                if *self.idle_probe_armed
                    && self.now.wrapping_sub(*self.state_entered_ms)
                        >= self.config.jump_to_app_timeout_ms
                {
                    *self.idle_probe_armed = false;
                    let status = image::post_validate(
                        &mut *self.platform,
                        &mut *self.sha,
                        &*self.ecdsa,
                        self.config,
                    );
                    if status.is_ok() {
                        self.handoff.set_boot_reason(BootReason::None);
                        let _ = self.platform.deinit_for_jump();
                        self.platform.jump_to(self.config.app_start_addr);
                    }
                }
            }
            State::Prepare => {
                if self.now.wrapping_sub(*self.state_entered_ms)
                    >= self.config.prepare_idle_timeout_ms
                {
                    let _ = self.erase_resident_header();
                    self.enter_idle();
                }
            }
            State::Flash => {
                if self.now.wrapping_sub(last_rx_ms) >= self.config.flash_idle_timeout_ms {
                    let _ = self.erase_resident_header();
                    self.enter_idle();
                }
            }
            State::Exit => {
                if self.now.wrapping_sub(*self.state_entered_ms)
                    >= self.config.exit_idle_timeout_ms
                {
                    let _ = self.erase_resident_header();
                    self.enter_idle();
                }
            }
        }
    }

    fn drain_wait(&mut self) {
        let start = self.platform.now_ms();
        while self
            .platform
            .now_ms()
            .wrapping_sub(start)
            < self.config.response_drain_ms
        {
            self.platform.kick_watchdog();
        }
    }

    fn fail_flash(&mut self) {
        let _ = self.erase_resident_header();
        self.respond(Command::FlashRsp, Status::FLASH_WRITE);
        self.enter_idle();
    }
}

impl<P: Platform, S: Sha256, V: EcdsaVerify> MessageHandler for Fsm<'_, '_, P, S, V> {
    fn on_connect(&mut self) {
        match *self.state {
            State::Idle => {
                self.handoff.set_boot_reason(BootReason::Com);
                self.respond(Command::ConnectRsp, Status::OK);
                self.go(State::Prepare);
            }
            _ => {
                let _ = self.erase_resident_header();
                self.respond(Command::ConnectRsp, Status::INVALID_REQUEST);
                self.enter_idle();
            }
        }
    }

    fn on_prepare(&mut self, payload: &[u8]) {
        if *self.state != State::Prepare {
            self.respond(Command::PrepareRsp, Status::INVALID_REQUEST);
            return;
        }

        // Pre-validation failures leave the resident image untouched;
        // nothing destructive has happened yet.
        let Ok(bytes) = <&[u8; HEADER_SIZE]>::try_from(payload) else {
            self.respond(Command::PrepareRsp, Status::VALIDATION);
            self.enter_idle();
            return;
        };
        let header = match ImageHeader::parse(bytes) {
            Ok(header) => header,
            Err(_) => {
                self.respond(Command::PrepareRsp, Status::VALIDATION);
                self.enter_idle();
                return;
            }
        };

        let resident = image::read_resident_header(&mut *self.platform, self.config);
        let pubkey = *self.platform.public_key();
        let status = image::pre_validate(&header, resident.as_ref(), self.config, &pubkey, self.ecdsa);
        if !status.is_ok() {
            self.respond(Command::PrepareRsp, status);
            self.enter_idle();
            return;
        }

        let total = HEADER_SIZE as u32 + header.image_size();
        if self.erase_region(header.image_addr(), total).is_err() {
            let _ = self.erase_resident_header();
            self.respond(Command::PrepareRsp, Status::FLASH_ERASE);
            self.enter_idle();
            return;
        }
        if self.write_header(header.image_addr(), bytes).is_err() {
            let _ = self.erase_resident_header();
            self.respond(Command::PrepareRsp, Status::FLASH_WRITE);
            self.enter_idle();
            return;
        }

        *self.flash_ctx = FlashCtx {
            working_addr: header.image_addr() + HEADER_SIZE as u32,
            flashed_bytes: 0,
            image_size: header.image_size(),
        };
        self.respond(Command::PrepareRsp, Status::OK);
        self.go(State::Flash);
    }

    fn on_flash(&mut self, data: &[u8]) {
        if *self.state != State::Flash {
            let _ = self.erase_resident_header();
            self.respond(Command::FlashRsp, Status::INVALID_REQUEST);
            self.enter_idle();
            return;
        }

        let remaining = self.flash_ctx.image_size - self.flash_ctx.flashed_bytes;
        if data.is_empty() || data.len() > DATA_PAYLOAD_SIZE || data.len() as u32 > remaining {
            // Also covers chunks arriving after the image completed.
            self.fail_flash();
            return;
        }

        self.platform.decrypt(data, &mut self.scratch[..]);
        if self
            .platform
            .flash_write(self.flash_ctx.working_addr, &self.scratch[..data.len()])
            .is_err()
        {
            self.fail_flash();
            return;
        }

        self.flash_ctx.working_addr += data.len() as u32;
        self.flash_ctx.flashed_bytes += data.len() as u32;
        let done = self.flash_ctx.flashed_bytes == self.flash_ctx.image_size;
        self.respond(Command::FlashRsp, Status::OK);
        if done {
            self.go(State::Exit);
        }
    }

    fn on_exit(&mut self) {
        if *self.state != State::Exit {
            if matches!(*self.state, State::Prepare | State::Flash) {
                let _ = self.erase_resident_header();
            }
            self.respond(Command::ExitRsp, Status::INVALID_REQUEST);
            self.enter_idle();
            return;
        }

        let status = image::post_validate(
            &mut *self.platform,
            &mut *self.sha,
            &*self.ecdsa,
            self.config,
        );
        if status.is_ok() {
            self.respond(Command::ExitRsp, Status::OK);
            self.drain_wait();
            self.handoff.set_boot_reason(BootReason::None);
            self.handoff.set_boot_count(0);
            let _ = self.platform.deinit_for_jump();
            self.platform.jump_to(self.config.app_start_addr);
        } else {
            let _ = self.erase_resident_header();
            self.respond(Command::ExitRsp, status);
            self.enter_idle();
        }
    }

    fn on_info(&mut self) {
        let status = if *self.state == State::Idle {
            Status::OK
        } else {
            Status::INVALID_REQUEST
        };
        let version = self.config.boot_version.to_le_bytes();
        self.respond_with(Command::InfoRsp, status, &version);
    }
}
