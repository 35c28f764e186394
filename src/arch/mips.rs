// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Exception entry, frame save/restore and the kernel register switch.
//!
//! Frames are addressed through the offsets in [`crate::frame`], which are
//! emitted as assembler symbols at the top of the block so the macros below
//! read like plain MIPS assembly.

use crate::{
    cp0::{cause, status},
    frame::{self, CpuRegs, KernRegs},
};
use core::mem::size_of;

extern "C" {
    /// Restores the frame at `sp` and returns from the exception.
    pub fn syscall_ret();
    /// Calls `s0` with `s1` as its argument on a fresh kernel stack.
    pub fn kernel_thread_entry();
    /// Saves the callee-saved registers into `prev` and loads `next`.
    pub fn cpu_switch(prev: *mut KernRegs, next: *const KernRegs);
    pub fn exception_entry();
}

// Provided by the kernel: `interrupt_handler(void)` and
// `syscall_handler(a0, a1, a2, a3, id) -> v0`.

core::arch::global_asm!(
    r#"
    .equ CTX_EPC, {ctx_epc}
    .equ CTX_STATUS, {ctx_status}
    .equ CTX_LO, {ctx_lo}
    .equ CTX_HI, {ctx_hi}
    .equ CTX_AT, {ctx_at}
    .equ CTX_V0, {ctx_v0}
    .equ CTX_V1, {ctx_v1}
    .equ CTX_A0, {ctx_a0}
    .equ CTX_A1, {ctx_a1}
    .equ CTX_A2, {ctx_a2}
    .equ CTX_A3, {ctx_a3}
    .equ CTX_T0, {ctx_t0}
    .equ CTX_T1, {ctx_t1}
    .equ CTX_T2, {ctx_t2}
    .equ CTX_T3, {ctx_t3}
    .equ CTX_T4, {ctx_t4}
    .equ CTX_T5, {ctx_t5}
    .equ CTX_T6, {ctx_t6}
    .equ CTX_T7, {ctx_t7}
    .equ CTX_S0, {ctx_s0}
    .equ CTX_S1, {ctx_s1}
    .equ CTX_S2, {ctx_s2}
    .equ CTX_S3, {ctx_s3}
    .equ CTX_S4, {ctx_s4}
    .equ CTX_S5, {ctx_s5}
    .equ CTX_S6, {ctx_s6}
    .equ CTX_S7, {ctx_s7}
    .equ CTX_T8, {ctx_t8}
    .equ CTX_T9, {ctx_t9}
    .equ CTX_GP, {ctx_gp}
    .equ CTX_SP, {ctx_sp}
    .equ CTX_S8, {ctx_s8}
    .equ CTX_RA, {ctx_ra}
    .equ CTX_SIZE, {ctx_size}
    .equ CTXREGS, {ctxregs}

    .equ KREG_S0, {kreg_s0}
    .equ KREG_S1, {kreg_s1}
    .equ KREG_S2, {kreg_s2}
    .equ KREG_S3, {kreg_s3}
    .equ KREG_S4, {kreg_s4}
    .equ KREG_S5, {kreg_s5}
    .equ KREG_S6, {kreg_s6}
    .equ KREG_S7, {kreg_s7}
    .equ KREG_S8, {kreg_s8}
    .equ KREG_GP, {kreg_gp}
    .equ KREG_SP, {kreg_sp}
    .equ KREG_RA, {kreg_ra}
    .equ KREG_KSTACK, {kreg_kstack}
    .equ KREG_STATUS, {kreg_status}
    .equ KREG_HAS_STATUS, {kreg_has_status}
    .equ CONFIG_MMU, {config_mmu}

    .equ KSU_MASK, {ksu_mask}
    .equ EXC_CODE_MASK, {exc_code_mask}
    .equ EXC_SYS, {exc_sys}

    # KSU, EXL, ERL and IE are the only status bits carried in a frame
    .equ STATUS_SAVE_MASK, 0x1f

    .macro CONTEXT_SAVE r
        .set push
        .set noat
        .set noreorder
        sw      $ra, CTX_RA(\r)
        sw      $s8, CTX_S8(\r)
        sw      $k0, CTX_SP(\r)
        sw      $gp, CTX_GP(\r)
        sw      $t9, CTX_T9(\r)
        sw      $t8, CTX_T8(\r)
        sw      $s7, CTX_S7(\r)
        sw      $s6, CTX_S6(\r)
        sw      $s5, CTX_S5(\r)
        sw      $s4, CTX_S4(\r)
        sw      $s3, CTX_S3(\r)
        sw      $s2, CTX_S2(\r)
        sw      $s1, CTX_S1(\r)
        sw      $s0, CTX_S0(\r)
        sw      $t7, CTX_T7(\r)
        sw      $t6, CTX_T6(\r)
        sw      $t5, CTX_T5(\r)
        sw      $t4, CTX_T4(\r)
        sw      $t3, CTX_T3(\r)
        sw      $t2, CTX_T2(\r)
        sw      $t1, CTX_T1(\r)
        sw      $t0, CTX_T0(\r)
        sw      $a3, CTX_A3(\r)
        sw      $a2, CTX_A2(\r)
        sw      $a1, CTX_A1(\r)
        sw      $a0, CTX_A0(\r)
        sw      $v1, CTX_V1(\r)
        sw      $v0, CTX_V0(\r)
        sw      $at, CTX_AT(\r)

        mfhi    $at
        sw      $at, CTX_HI(\r)
        mflo    $at
        sw      $at, CTX_LO(\r)

        mfc0    $t0, $12
        mfc0    $t1, $14
        andi    $t2, $t0, STATUS_SAVE_MASK
    .if CONFIG_MMU
        li      $t3, ~STATUS_SAVE_MASK
        and     $t0, $t0, $t3
    .endif
        sw      $t2, CTX_STATUS(\r)
        sw      $t1, CTX_EPC(\r)
        mtc0    $t0, $12
        .set pop
    .endm

    .macro CONTEXT_RESTORE r
        .set push
        .set noat
        .set noreorder
        mfc0    $t0, $12
        lw      $t1, CTX_STATUS(\r)
        li      $t2, ~STATUS_SAVE_MASK
        and     $t0, $t0, $t2
        or      $t0, $t0, $t1
        mtc0    $t0, $12

        lw      $t3, CTX_EPC(\r)
        lw      $t4, CTX_LO(\r)
        lw      $t5, CTX_HI(\r)
        mtc0    $t3, $14
        mtlo    $t4
        mthi    $t5

        lw      $at, CTX_AT(\r)
        lw      $v0, CTX_V0(\r)
        lw      $v1, CTX_V1(\r)
        lw      $a0, CTX_A0(\r)
        lw      $a1, CTX_A1(\r)
        lw      $a2, CTX_A2(\r)
        lw      $a3, CTX_A3(\r)
        lw      $t0, CTX_T0(\r)
        lw      $t1, CTX_T1(\r)
        lw      $t2, CTX_T2(\r)
        lw      $t3, CTX_T3(\r)
        lw      $t4, CTX_T4(\r)
        lw      $t5, CTX_T5(\r)
        lw      $t6, CTX_T6(\r)
        lw      $t7, CTX_T7(\r)
        lw      $s0, CTX_S0(\r)
        lw      $s1, CTX_S1(\r)
        lw      $s2, CTX_S2(\r)
        lw      $s3, CTX_S3(\r)
        lw      $s4, CTX_S4(\r)
        lw      $s5, CTX_S5(\r)
        lw      $s6, CTX_S6(\r)
        lw      $s7, CTX_S7(\r)
        lw      $t8, CTX_T8(\r)
        lw      $t9, CTX_T9(\r)
        lw      $gp, CTX_GP(\r)
        lw      $s8, CTX_S8(\r)
        lw      $ra, CTX_RA(\r)
        # Stack goes last
        lw      $sp, CTX_SP(\r)
        .set pop
    .endm

    .section .data
    .balign 4
    .globl hal_current_kregs
hal_current_kregs:
    .word 0

    .section .text
    .set noreorder
    .set noat

    .balign 4
    .globl exception_entry
exception_entry:
    mfc0    $k1, $12
    andi    $k1, $k1, KSU_MASK
    beqz    $k1, 1f
    move    $k0, $sp

    # From user mode, the frame goes at the top of the thread's kernel stack
    la      $k1, hal_current_kregs
    lw      $k1, 0($k1)
    nop
    lw      $sp, KREG_KSTACK($k1)
    nop
    b       2f
    addiu   $sp, $sp, -CTX_SIZE

1:
    addiu   $sp, $sp, -CTXREGS
2:
    CONTEXT_SAVE $sp
    # s0 is in the frame already and survives the calls below
    move    $s0, $sp
    addiu   $sp, $sp, -24

    mfc0    $t0, $13
    andi    $t0, $t0, EXC_CODE_MASK
    srl     $t0, $t0, 2
    beqz    $t0, 3f
    li      $t1, EXC_SYS
    beq     $t0, $t1, 4f
    nop

    jal     trap_handler
    move    $a0, $s0
    b       5f
    nop

3:
    jal     interrupt_handler
    nop
    b       5f
    nop

4:
    # Resume after the syscall instruction
    lw      $t0, CTX_EPC($s0)
    nop
    addiu   $t0, $t0, 4
    sw      $t0, CTX_EPC($s0)

    # syscall_handler(a0, a1, a2, a3, id), the id travelling in v0
    lw      $a0, CTX_A0($s0)
    lw      $a1, CTX_A1($s0)
    lw      $a2, CTX_A2($s0)
    lw      $a3, CTX_A3($s0)
    lw      $t1, CTX_V0($s0)
    nop
    jal     syscall_handler
    sw      $t1, 16($sp)
    sw      $v0, CTX_V0($s0)

5:
    move    $sp, $s0

    .globl syscall_ret
syscall_ret:
    CONTEXT_RESTORE $sp
    eret
    nop

    .balign 4
    .globl kernel_thread_entry
kernel_thread_entry:
    jalr    $s0
    move    $a0, $s1
1:
    b       1b
    nop

    .balign 4
    .globl cpu_switch
cpu_switch:
    sw      $s0, KREG_S0($a0)
    sw      $s1, KREG_S1($a0)
    sw      $s2, KREG_S2($a0)
    sw      $s3, KREG_S3($a0)
    sw      $s4, KREG_S4($a0)
    sw      $s5, KREG_S5($a0)
    sw      $s6, KREG_S6($a0)
    sw      $s7, KREG_S7($a0)
    sw      $s8, KREG_S8($a0)
    sw      $gp, KREG_GP($a0)
    sw      $sp, KREG_SP($a0)
    sw      $ra, KREG_RA($a0)
.if KREG_HAS_STATUS
    mfc0    $t0, $12
    sw      $t0, KREG_STATUS($a0)
.endif

    la      $t1, hal_current_kregs
    sw      $a1, 0($t1)

    lw      $s0, KREG_S0($a1)
    lw      $s1, KREG_S1($a1)
    lw      $s2, KREG_S2($a1)
    lw      $s3, KREG_S3($a1)
    lw      $s4, KREG_S4($a1)
    lw      $s5, KREG_S5($a1)
    lw      $s6, KREG_S6($a1)
    lw      $s7, KREG_S7($a1)
    lw      $s8, KREG_S8($a1)
    lw      $gp, KREG_GP($a1)
    lw      $sp, KREG_SP($a1)
    lw      $ra, KREG_RA($a1)
.if KREG_HAS_STATUS
    lw      $t0, KREG_STATUS($a1)
    nop
    mtc0    $t0, $12
.endif
    jr      $ra
    nop

    .set at
    .set reorder
"#,
    ctx_epc = const frame::CTX_EPC,
    ctx_status = const frame::CTX_STATUS,
    ctx_lo = const frame::CTX_LO,
    ctx_hi = const frame::CTX_HI,
    ctx_at = const frame::CTX_AT,
    ctx_v0 = const frame::CTX_V0,
    ctx_v1 = const frame::CTX_V1,
    ctx_a0 = const frame::CTX_A0,
    ctx_a1 = const frame::CTX_A1,
    ctx_a2 = const frame::CTX_A2,
    ctx_a3 = const frame::CTX_A3,
    ctx_t0 = const frame::CTX_T0,
    ctx_t1 = const frame::CTX_T1,
    ctx_t2 = const frame::CTX_T2,
    ctx_t3 = const frame::CTX_T3,
    ctx_t4 = const frame::CTX_T4,
    ctx_t5 = const frame::CTX_T5,
    ctx_t6 = const frame::CTX_T6,
    ctx_t7 = const frame::CTX_T7,
    ctx_s0 = const frame::CTX_S0,
    ctx_s1 = const frame::CTX_S1,
    ctx_s2 = const frame::CTX_S2,
    ctx_s3 = const frame::CTX_S3,
    ctx_s4 = const frame::CTX_S4,
    ctx_s5 = const frame::CTX_S5,
    ctx_s6 = const frame::CTX_S6,
    ctx_s7 = const frame::CTX_S7,
    ctx_t8 = const frame::CTX_T8,
    ctx_t9 = const frame::CTX_T9,
    ctx_gp = const frame::CTX_GP,
    ctx_sp = const frame::CTX_SP,
    ctx_s8 = const frame::CTX_S8,
    ctx_ra = const frame::CTX_RA,
    ctx_size = const size_of::<CpuRegs>(),
    ctxregs = const frame::CTXREGS,
    kreg_s0 = const frame::KREG_S0,
    kreg_s1 = const frame::KREG_S1,
    kreg_s2 = const frame::KREG_S2,
    kreg_s3 = const frame::KREG_S3,
    kreg_s4 = const frame::KREG_S4,
    kreg_s5 = const frame::KREG_S5,
    kreg_s6 = const frame::KREG_S6,
    kreg_s7 = const frame::KREG_S7,
    kreg_s8 = const frame::KREG_S8,
    kreg_gp = const frame::KREG_GP,
    kreg_sp = const frame::KREG_SP,
    kreg_ra = const frame::KREG_RA,
    kreg_kstack = const frame::KREG_KSTACK,
    kreg_status = const STATUS_SLOT,
    kreg_has_status = const cfg!(not(feature = "mmu")) as usize,
    config_mmu = const cfg!(feature = "mmu") as usize,
    ksu_mask = const status::KSU_MASK,
    exc_code_mask = const cause::EXC_CODE_MASK,
    exc_sys = const cause::EXC_SYS,
);

#[cfg(not(feature = "mmu"))]
const STATUS_SLOT: usize = frame::KREG_STATUS;
// Never referenced by the assembly when the status slot is absent
#[cfg(feature = "mmu")]
const STATUS_SLOT: usize = frame::KREGS;
