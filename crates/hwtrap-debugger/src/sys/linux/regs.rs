use nix::libc;

use crate::common::registers::Registers;

#[cfg(target_arch = "x86_64")]
impl From<libc::user_regs_struct> for Registers {
    fn from(regs: libc::user_regs_struct) -> Self {
        Self {
            rax: regs.rax,
            rbx: regs.rbx,
            rcx: regs.rcx,
            rdx: regs.rdx,
            rdi: regs.rdi,
            rsi: regs.rsi,
            rsp: regs.rsp,
            rbp: regs.rbp,
            rip: regs.rip,
            r8: regs.r8,
            r9: regs.r9,
            r10: regs.r10,
            r11: regs.r11,
            r12: regs.r12,
            r13: regs.r13,
            r14: regs.r14,
            r15: regs.r15,
        }
    }
}

#[cfg(target_arch = "x86")]
impl From<libc::user_regs_struct> for Registers {
    fn from(regs: libc::user_regs_struct) -> Self {
        Self {
            eax: regs.eax as u32,
            ebx: regs.ebx as u32,
            ecx: regs.ecx as u32,
            edx: regs.edx as u32,
            edi: regs.edi as u32,
            esi: regs.esi as u32,
            esp: regs.esp as u32,
            ebp: regs.ebp as u32,
            eip: regs.eip as u32,
        }
    }
}
