// SPDX-License-Identifier: MIT

//! Board capabilities behind the loader's platform contract.

use boot_consts::PUBLIC_KEY;
use boot_core::platform::{IoError, Platform};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::peripherals::UARTE0;
use embassy_nrf::uarte::UarteTx;
use embassy_nrf::wdt::WatchdogHandle;
use embassy_time::Instant;
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use heapless::Deque;

/// Bytes buffered between loader steps, a couple of frames deep.
const RX_QUEUE: usize = 2 * 1024;

pub struct Board<'d> {
    rx: Deque<u8, RX_QUEUE>,
    tx: UarteTx<'d, UARTE0>,
    flash: Nvmc<'d>,
    wdt: WatchdogHandle,
    #[cfg(feature = "crypto")]
    decryptor: crate::crypto::Decryptor,
}

impl<'d> Board<'d> {
    pub fn new(tx: UarteTx<'d, UARTE0>, flash: Nvmc<'d>, wdt: WatchdogHandle) -> Self {
        Board {
            rx: Deque::new(),
            tx,
            flash,
            wdt,
            #[cfg(feature = "crypto")]
            decryptor: crate::crypto::Decryptor::new(),
        }
    }

    /// Queue bytes read off the wire. A full queue drops the tail; the
    /// parser's buffer-full path resynchronizes the stream.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let _ = self.rx.push_back(b);
        }
    }
}

impl Platform for Board<'_> {
    fn now_ms(&mut self) -> u32 {
        Instant::now().as_millis() as u32
    }

    fn rx_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn clear_rx(&mut self) {
        self.rx.clear();
    }

    fn tx_all(&mut self, data: &[u8]) -> Result<(), IoError> {
        self.tx.blocking_write(data).map_err(|_| IoError)
    }

    fn flash_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), IoError> {
        self.flash.read(addr, buf).map_err(|_| IoError)
    }

    fn flash_write(&mut self, addr: u32, data: &[u8]) -> Result<(), IoError> {
        self.flash.write(addr, data).map_err(|_| IoError)
    }

    fn flash_erase(&mut self, addr: u32, len: u32) -> Result<(), IoError> {
        let end = addr.checked_add(len).ok_or(IoError)?;
        self.flash.erase(addr, end).map_err(|_| IoError)
    }

    fn kick_watchdog(&mut self) {
        self.wdt.pet();
    }

    fn public_key(&self) -> &[u8; 64] {
        &PUBLIC_KEY
    }

    #[cfg(feature = "crypto")]
    fn decrypt_reset(&mut self) {
        self.decryptor.reset();
    }

    #[cfg(feature = "crypto")]
    fn decrypt(&mut self, src: &[u8], dst: &mut [u8]) {
        self.decryptor.decrypt(src, dst);
    }

    fn jump_to(&mut self, addr: u32) -> ! {
        unsafe { crate::jump::jump_to_app(addr) }
    }
}
