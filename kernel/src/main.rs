//! Kernel binary entry point
//!
//! Multiboot hands control to `_start` with the magic in `eax` and the
//! boot-information pointer in `ebx`. `kernel_main` brings the machine up
//! in dependency order and then hands the CPU to the first shell, which
//! never gives it back.

#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod boot {
    use core::arch::global_asm;
    use core::panic::PanicInfo;

    use trident_kernel::arch::x86::{self, gdt, idt, irq, multiboot, pic};
    use trident_kernel::{drivers, fs, log_service, mm, process, serial, terminal, timer};

    // Multiboot v1 header (page-aligned modules + memory info), a 16 KiB
    // boot stack, and the entry stub that calls into Rust.
    global_asm!(
        r#"
.section .multiboot
.align 4
.long 0x1BADB002
.long 0x00000003
.long -(0x1BADB002 + 0x00000003)

.section .bss
.align 16
boot_stack_bottom:
.skip 16384
boot_stack_top:

.section .text
.global _start
_start:
    mov esp, offset boot_stack_top
    push ebx
    push eax
    call kernel_main
1:
    hlt
    jmp 1b
"#
    );

    #[no_mangle]
    extern "C" fn kernel_main(magic: u32, info_addr: u32) -> ! {
        serial::init();
        log_service::init();
        log::info!("trident kernel starting");

        if magic != multiboot::BOOTLOADER_MAGIC {
            log::error!("bad bootloader magic {magic:#x}");
            terminal::fatal(" Invalid Bootloader Handoff ");
        }

        // SAFETY: the bootloader magic was just verified.
        let info = unsafe { multiboot::BootInfo::from_addr(info_addr) };
        let Some(module) = info.modules().first() else {
            terminal::fatal(" No Filesystem Image Loaded ");
        };
        if let Err(err) = fs::init(module.bytes()) {
            log::error!("filesystem image rejected: {err}");
            terminal::fatal(" Bad Filesystem Image ");
        }

        gdt::init();
        idt::init();
        pic::init();
        irq::set_handler(0, timer::interrupt);
        irq::set_handler(1, drivers::keyboard::interrupt);
        irq::set_handler(8, drivers::rtc::interrupt);

        mm::init();
        terminal::init();
        timer::init();
        drivers::rtc::init();
        drivers::keyboard::init();

        let fs = fs::get().expect("filesystem initialized above");
        log::info!(
            "filesystem: {} entries, {} inodes, {} data blocks",
            fs.dir_entry_count(),
            fs.inode_count(),
            fs.data_block_count()
        );

        // Interrupts stay off until this iret; the shell arrives in ring 3
        // with them enabled and the scheduler takes it from there.
        let _ = process::execute::execute(b"shell");
        terminal::fatal(" Could Not Start The First Shell ")
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        log::error!("kernel panic: {info}");
        x86::halt_forever()
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn main() {}
