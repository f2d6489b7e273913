//! Global descriptor table and task-state segment
//!
//! Flat 4 GiB segments for rings 0 and 3 plus a single 32-bit TSS. The TSS
//! exists only for its ring-0 stack slot: on every user-to-kernel transition
//! the CPU loads `ss0:esp0` from here, so the scheduler and the `execute`
//! path must keep `esp0` pointed at the running process's kernel stack.

use core::arch::asm;
use core::mem::size_of;

use crate::sync::InterruptCell;

/// Kernel code segment selector.
pub const KERNEL_CS: u16 = 0x08;
/// Kernel data segment selector.
pub const KERNEL_DS: u16 = 0x10;
/// User code segment selector (RPL 3).
pub const USER_CS: u16 = 0x1B;
/// User data segment selector (RPL 3).
pub const USER_DS: u16 = 0x23;
/// TSS selector.
const TSS_SELECTOR: u16 = 0x28;

/// 32-bit task-state segment. Only `esp0`/`ss0` are ever consulted; the
/// rest exists to give the descriptor its architectural 104-byte shape.
#[repr(C, packed)]
pub struct TaskStateSegment {
    link: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldtr: u32,
    iomap_base: u32,
}

impl TaskStateSegment {
    const fn new() -> Self {
        Self {
            link: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldtr: 0,
            // I/O map past the segment limit: no port bitmap.
            iomap_base: (size_of::<TaskStateSegment>() as u32) << 16,
        }
    }
}

static TSS: InterruptCell<TaskStateSegment> = InterruptCell::new(TaskStateSegment::new());

/// Flat ring-0 code segment: base 0, limit 4 GiB, 32-bit, page granular.
const KERNEL_CODE_DESCRIPTOR: u64 = 0x00CF_9A00_0000_FFFF;
/// Flat ring-0 data segment.
const KERNEL_DATA_DESCRIPTOR: u64 = 0x00CF_9200_0000_FFFF;
/// Flat ring-3 code segment.
const USER_CODE_DESCRIPTOR: u64 = 0x00CF_FA00_0000_FFFF;
/// Flat ring-3 data segment.
const USER_DATA_DESCRIPTOR: u64 = 0x00CF_F200_0000_FFFF;

static GDT: InterruptCell<[u64; 6]> = InterruptCell::new([0; 6]);

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

/// Available 32-bit TSS descriptor for the given base address.
fn tss_descriptor(base: u32) -> u64 {
    let limit = (size_of::<TaskStateSegment>() - 1) as u64;
    limit
        | ((base as u64 & 0x00FF_FFFF) << 16)
        | (0x89u64 << 40)
        | (((base as u64 >> 24) & 0xFF) << 56)
}

/// Build the GDT, load it, reload every segment register, and load the task
/// register. Called once during boot with interrupts disabled.
pub fn init() {
    // SAFETY: boot path, single thread, interrupts disabled by the caller;
    // the descriptor tables are static so the loaded pointers stay valid.
    unsafe {
        let tss = TSS.get_mut();
        tss.ss0 = KERNEL_DS as u32;

        let gdt = GDT.get_mut();
        gdt[0] = 0;
        gdt[1] = KERNEL_CODE_DESCRIPTOR;
        gdt[2] = KERNEL_DATA_DESCRIPTOR;
        gdt[3] = USER_CODE_DESCRIPTOR;
        gdt[4] = USER_DATA_DESCRIPTOR;
        gdt[5] = tss_descriptor(TSS.as_ptr() as u32);

        let pointer = DescriptorTablePointer {
            limit: (size_of::<[u64; 6]>() - 1) as u16,
            base: GDT.as_ptr() as u32,
        };

        asm!(
            "lgdt [{ptr}]",
            // Far return to reload CS with the new kernel code selector.
            "push {kcs}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov {tmp}, {kds}",
            "mov ds, {tmp:x}",
            "mov es, {tmp:x}",
            "mov fs, {tmp:x}",
            "mov gs, {tmp:x}",
            "mov ss, {tmp:x}",
            ptr = in(reg) &pointer as *const DescriptorTablePointer,
            kcs = const KERNEL_CS as u32,
            kds = const KERNEL_DS as u32,
            tmp = out(reg) _,
        );
        asm!("ltr {sel:x}", sel = in(reg) TSS_SELECTOR, options(nomem, nostack));
    }
}

/// Point the TSS ring-0 stack at `esp0`.
///
/// Must be called with interrupts disabled; the value takes effect at the
/// next user-to-kernel transition.
pub fn set_kernel_stack(esp0: u32) {
    // SAFETY: single write under the caller's interrupts-disabled contract.
    unsafe { TSS.get_mut().esp0 = esp0 };
}
