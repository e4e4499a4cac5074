// SPDX-License-Identifier: MIT

//! Hand-over to the resident application.

use cortex_m::peripheral::{NVIC, SCB};
use defmt::info;
use embassy_nrf::interrupt::Interrupt;

/// Boots the application whose vector table sits at `addr`.
///
/// # Safety
///
/// This modifies the stack pointer and reset vector and will run whatever
/// code the application vector table points at.
pub unsafe fn jump_to_app(addr: u32) -> ! {
    // Quiet the interrupts the loader enabled.
    NVIC::mask(Interrupt::UARTE0_UART0);

    // The application owns the vector table from here on.
    (*SCB::PTR).vtor.write(addr);

    let msp = *(addr as *const u32);
    let rv = *((addr + 4) as *const u32);

    info!("msp = {=u32:x}, rv = {=u32:x}", msp, rv);

    // These instructions perform the following operations:
    //
    // * Modify control register to use MSP as stack pointer (clear spsel bit)
    // * Synchronize instruction barrier
    // * Initialize stack pointer from the application vector table
    // * Set link register to not return (0xFF)
    // * Jump to the application reset vector
    core::arch::asm!(
        "mrs {tmp}, CONTROL",
        "bics {tmp}, {spsel}",
        "msr CONTROL, {tmp}",
        "isb",
        "msr MSP, {msp}",
        "mov lr, {new_lr}",
        "bx {rv}",
        // `out(reg) _` is not permitted in a `noreturn` asm! call,
        // so instead use `in(reg) 0` and don't restore it afterwards.
        tmp = in(reg) 0,
        spsel = in(reg) 2,
        new_lr = in(reg) 0xFFFFFFFFu32,
        msp = in(reg) msp,
        rv = in(reg) rv,
        options(noreturn),
    );
}
