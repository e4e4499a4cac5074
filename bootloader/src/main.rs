// SPDX-License-Identifier: MIT

#![no_std]
#![no_main]

mod crypto;
mod jump;
mod platform;

use defmt_rtt as _;
use panic_probe as _;

use boot_consts::{
    APP_HEAD_ADDR, APP_SIZE_MAX, APP_START_ADDR, BOOT_CNT_LIMIT, BOOT_VERSION, FLASH_PAGE,
    SHARED_MEM_ADDR,
};
use boot_core::handoff::{Handoff, HANDOFF_SIZE};
use boot_core::{Config, Loader};
use defmt::info;
use embassy_executor::Spawner;
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::{bind_interrupts, peripherals, uarte, wdt};
use embassy_time::{with_timeout, Duration};
use platform::Board;

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

fn loader_config() -> Config {
    Config {
        app_head_addr: APP_HEAD_ADDR,
        app_start_addr: APP_START_ADDR,
        page_size: FLASH_PAGE,
        boot_version: BOOT_VERSION,
        app_size_max: Some(APP_SIZE_MAX),
        require_signature: cfg!(feature = "boot-signed-fw"),
        boot_count_limit: Some(BOOT_CNT_LIMIT),
        ..Config::default()
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());

    let mut config_uart = uarte::Config::default();
    config_uart.parity = uarte::Parity::EXCLUDED;
    config_uart.baudrate = uarte::Baudrate::BAUD115200;
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_16, p.P0_18, config_uart);
    let (tx, mut rx) = uart.split_with_idle(p.TIMER0, p.PPI_CH0, p.PPI_CH1);

    let mut wdt_config = wdt::Config::default();
    wdt_config.timeout_ticks = 32768 * 5;
    let Ok((_wdt, [wdt_handle])) = wdt::Watchdog::try_new(p.WDT, wdt_config) else {
        core::panic!("watchdog already running with a foreign config");
    };

    let flash = Nvmc::new(p.NVMC);

    // The handoff region sits above the RAM the linker knows about, so it
    // survives the reset into (and out of) the application.
    let shared = unsafe { &mut *(SHARED_MEM_ADDR as *mut [u8; HANDOFF_SIZE]) };
    let handoff = Handoff::new(shared);

    let board = Board::new(tx, flash, wdt_handle);
    let mut loader = Loader::new(board, crypto::Sha::new(), crypto::Ecc, handoff, loader_config());

    info!("bootloader {:#010x} up", BOOT_VERSION);
    loader.start();

    let mut raw = [0u8; 64];
    let mut last_state = loader.state();
    loop {
        if let Ok(Ok(n)) =
            with_timeout(Duration::from_millis(1), rx.read_until_idle(&mut raw)).await
        {
            loader.platform_mut().push_rx(&raw[..n]);
        }
        loader.handle();

        let state = loader.state();
        if state != last_state {
            info!("boot state: {}", state);
            last_state = state;
        }
    }
}
