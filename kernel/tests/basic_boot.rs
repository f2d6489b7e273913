//! Boot smoke test
//!
//! Boots the kernel's subsystems on the real target under QEMU and proves
//! the machine actually comes up: descriptor tables load, paging turns on
//! and still maps the video surface, the PIC/IDT/PIT chain delivers timer
//! interrupts through the generic wrapper, and — when the filesystem
//! image is supplied as the first boot module — the first shell is
//! resolvable and carries the executable magic, which is the last gate
//! before `execute` would hand it the CPU.
//!
//! Run with:
//!
//! ```sh
//! cargo build --test basic_boot --target targets/i686-trident.json \
//!     -Zbuild-std=core -Zbuild-std-features=compiler-builtins-mem
//! qemu-system-i386 -kernel <built test binary> -initrd <fs image> \
//!     -device isa-debug-exit,iobase=0xf4,iosize=0x04 \
//!     -serial stdio -display none -no-reboot
//! ```
//!
//! Exit status 33 is success. On the host this file builds as an empty
//! binary; the assertions only exist on the bare-metal target.

#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod bare {
    use core::arch::global_asm;
    use core::panic::PanicInfo;
    use core::sync::atomic::{AtomicU32, Ordering};

    use trident_kernel::arch::x86::{gdt, idt, interrupts, irq, multiboot, pic};
    use trident_kernel::process::execute::parse_header;
    use trident_kernel::{
        exit_qemu, fs, log_service, mm, serial, serial_println, terminal, timer, QemuExitCode,
    };

    global_asm!(
        r#"
.section .multiboot
.align 4
.long 0x1BADB002
.long 0x00000003
.long -(0x1BADB002 + 0x00000003)

.section .bss
.align 16
test_stack_bottom:
.skip 16384
test_stack_top:

.section .text
.global _start
_start:
    mov esp, offset test_stack_top
    push ebx
    push eax
    call test_main
1:
    hlt
    jmp 1b
"#
    );

    #[no_mangle]
    extern "C" fn test_main(magic: u32, info_addr: u32) -> ! {
        serial::init();
        log_service::init();
        serial_println!("Starting boot smoke tests...");

        assert_eq!(magic, multiboot::BOOTLOADER_MAGIC, "multiboot handoff");

        gdt::init();
        idt::init();
        pic::init();
        mm::init();
        terminal::init();

        test_paging_maps_video();
        test_user_check_rejects_kernel_space();
        test_timer_interrupt_fires();
        test_shell_is_loadable(info_addr);

        serial_println!("All boot smoke tests passed!");
        exit_qemu(QemuExitCode::Success)
    }

    /// With paging on, the video page must still reach the text surface.
    fn test_paging_maps_video() {
        let cell = mm::VIDEO_PHYS as *mut u16;
        // SAFETY: the kernel directory maps the video page writable, and
        // nothing else touches the screen during the test.
        unsafe {
            core::ptr::write_volatile(cell, 0x0742);
            assert_eq!(core::ptr::read_volatile(cell), 0x0742);
        }
        serial_println!("paging maps the video surface... [ok]");
    }

    /// Before any process exists nothing is user-accessible.
    fn test_user_check_rejects_kernel_space() {
        assert!(!mm::is_user_addr(mm::KERNEL_BASE));
        assert!(!mm::is_user_addr(mm::PROGRAM_LOAD_VA));
        serial_println!("user-pointer check rejects kernel space... [ok]");
    }

    static TICKS: AtomicU32 = AtomicU32::new(0);

    fn count_tick() {
        TICKS.fetch_add(1, Ordering::Relaxed);
    }

    /// The PIC/IDT/PIT chain must deliver timer interrupts through the
    /// generic wrapper.
    fn test_timer_interrupt_fires() {
        irq::set_handler(0, count_tick);
        timer::init();
        interrupts::enable();
        let mut spins: u32 = 0;
        while TICKS.load(Ordering::Relaxed) < 2 {
            spins += 1;
            assert!(spins < 1_000_000_000, "timer interrupt never arrived");
            core::hint::spin_loop();
        }
        interrupts::disable();
        serial_println!("timer interrupts arrive... [ok]");
    }

    /// When the filesystem image is supplied, the first shell must
    /// resolve and carry the executable magic — the last gate before
    /// `execute` would drop it into ring 3.
    fn test_shell_is_loadable(info_addr: u32) {
        // SAFETY: the multiboot magic was verified in `test_main`.
        let info = unsafe { multiboot::BootInfo::from_addr(info_addr) };
        let Some(module) = info.modules().first() else {
            serial_println!("no boot module; skipping the shell load check");
            return;
        };
        fs::init(module.bytes()).expect("boot module is a filesystem image");
        let fs = fs::get().unwrap();
        let dentry = fs.dentry_by_name(b"shell").expect("shell present in the image");
        let mut header = [0u8; 28];
        let got = fs.read_file(dentry.inode, 0, &mut header).unwrap();
        let entry = parse_header(&header[..got]).expect("shell carries the executable magic");
        assert!(entry >= mm::PROGRAM_VA);
        serial_println!("first shell resolves and parses... [ok]");
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        trident_kernel::test_panic_handler(info)
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn main() {}
