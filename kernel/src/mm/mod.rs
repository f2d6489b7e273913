//! Address-space management
//!
//! One shared kernel page directory plus one directory per process, all
//! statically allocated. Every directory maps the kernel region as a single
//! global 4 MiB supervisor page; a process directory adds its 4 MiB program
//! window at 128 MiB and a video page table chosen by the terminal the
//! process belongs to. The kernel directory additionally identity-maps all
//! program image frames so executables can be copied without leaving it.

pub mod paging;

pub use paging::{EntryFlags, PageDirectory, PageTable};

/// 4 KiB page.
pub const PAGE_SIZE: usize = 4096;
/// 4 MiB large page.
pub const LARGE_PAGE_SIZE: usize = 4 * 1024 * 1024;

/// Physical and virtual base of the kernel image.
pub const KERNEL_BASE: u32 = 0x0040_0000;
/// End of the kernel region; per-process kernel stacks grow down from here.
pub const KERNEL_REGION_END: u32 = 0x0080_0000;

/// Virtual base of the 4 MiB program window.
pub const PROGRAM_VA: u32 = 0x0800_0000;
/// Load address of a program image inside its window.
pub const PROGRAM_LOAD_VA: u32 = 0x0804_8000;
/// Top of the user stack: the last mapped dword of the program window.
pub const USER_STACK_TOP: u32 = PROGRAM_VA + LARGE_PAGE_SIZE as u32 - 4;
/// Bytes available for an image between its load address and window end.
pub const MAX_IMAGE_BYTES: usize = LARGE_PAGE_SIZE - (PROGRAM_LOAD_VA - PROGRAM_VA) as usize;

/// Physical text-mode video buffer.
pub const VIDEO_PHYS: u32 = 0xB8000;
/// Fixed user virtual address handed out by `vidmap`: the video offset
/// aliased inside the 4 MiB directory slot at 132 MiB.
pub const VIDMAP_VA: u32 = 0x0840_0000 + VIDEO_PHYS;

/// Physical frame backing process `pid`'s program window.
pub fn image_frame(pid: usize) -> u32 {
    KERNEL_REGION_END + (pid as u32) * LARGE_PAGE_SIZE as u32
}

/// Shadow frame for terminal `terminal`, directly above the physical buffer.
pub fn shadow_frame(terminal: usize) -> u32 {
    VIDEO_PHYS + (terminal as u32 + 1) * PAGE_SIZE as u32
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod active {
    use core::arch::asm;

    use super::paging::{EntryFlags, PageDirectory, PageTable};
    use super::*;
    use crate::process::MAX_PROCESSES;
    use crate::sync::InterruptCell;
    use crate::terminal::MAX_TERMINALS;

    /// Directory the kernel runs on between processes and during boot.
    static KERNEL_DIRECTORY: InterruptCell<PageDirectory> =
        InterruptCell::new(PageDirectory::new());

    /// One directory per potential process, indexed by pid.
    static PROCESS_DIRECTORIES: InterruptCell<[PageDirectory; MAX_PROCESSES]> = {
        const DIR: PageDirectory = PageDirectory::new();
        InterruptCell::new([DIR; MAX_PROCESSES])
    };

    /// Identity map of the low 4 MiB for the kernel directory, carrying the
    /// physical text buffer and the three shadow frames.
    static LOW_TABLE: InterruptCell<PageTable> = InterruptCell::new(PageTable::new());

    /// Per-terminal video tables. Table `t` maps the video page at the
    /// surface terminal `t` currently owns: the physical buffer while
    /// visible, the terminal's shadow frame otherwise.
    static VIDEO_TABLES: InterruptCell<[PageTable; MAX_TERMINALS]> = {
        const TABLE: PageTable = PageTable::new();
        InterruptCell::new([TABLE; MAX_TERMINALS])
    };

    fn kernel_flags() -> EntryFlags {
        EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::GLOBAL
    }

    /// Build the kernel directory and the static tables, then turn paging
    /// on. Boot path, interrupts disabled.
    pub fn init() {
        // SAFETY: boot path, single thread, interrupts disabled.
        unsafe {
            let low = LOW_TABLE.get_mut();
            low.map(VIDEO_PHYS, VIDEO_PHYS, EntryFlags::PRESENT | EntryFlags::WRITABLE);
            for terminal in 0..MAX_TERMINALS {
                let shadow = shadow_frame(terminal);
                low.map(shadow, shadow, EntryFlags::PRESENT | EntryFlags::WRITABLE);
            }

            let tables = VIDEO_TABLES.get_mut();
            for (terminal, table) in tables.iter_mut().enumerate() {
                // Shadows are reachable from every terminal's table so the
                // switch path can copy under any directory.
                for other in 0..MAX_TERMINALS {
                    let shadow = shadow_frame(other);
                    table.map(shadow, shadow, EntryFlags::PRESENT | EntryFlags::WRITABLE);
                }
                // Terminal 0 is visible at boot and owns the physical
                // buffer; the others start on their shadows.
                let surface = if terminal == 0 {
                    VIDEO_PHYS
                } else {
                    shadow_frame(terminal)
                };
                table.map(
                    VIDEO_PHYS,
                    surface,
                    EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER,
                );
            }

            let kernel_dir = KERNEL_DIRECTORY.get_mut();
            kernel_dir.map_large(KERNEL_BASE, KERNEL_BASE, kernel_flags());
            kernel_dir.map_table(
                0,
                LOW_TABLE.as_ptr() as u32,
                EntryFlags::PRESENT | EntryFlags::WRITABLE,
            );
            // Identity windows over every program frame, so `execute` can
            // copy an image into any frame from the kernel directory.
            for pid in 0..MAX_PROCESSES {
                let frame = image_frame(pid);
                kernel_dir.map_large(frame, frame, EntryFlags::PRESENT | EntryFlags::WRITABLE);
            }

            enable_paging(KERNEL_DIRECTORY.as_ptr() as u32);
        }
    }

    /// Build process `pid`'s directory from scratch: kernel region, program
    /// window, and the video table of `terminal`.
    ///
    /// Caller must have interrupts disabled.
    pub fn build_process_directory(pid: usize, terminal: usize) {
        // SAFETY: interrupts disabled per the caller's contract; `pid` owns
        // this directory slot exclusively until the process dies.
        unsafe {
            let dir = &mut PROCESS_DIRECTORIES.get_mut()[pid];
            dir.clear();
            dir.map_large(KERNEL_BASE, KERNEL_BASE, kernel_flags());
            dir.map_large(
                PROGRAM_VA,
                image_frame(pid),
                EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER,
            );
            // The video table is supervisor-only at this slot; `vidmap`
            // exposes it to ring 3 at VIDMAP_VA on request.
            let table = &VIDEO_TABLES.get_mut()[terminal];
            dir.map_table(
                VIDEO_PHYS,
                table as *const PageTable as u32,
                EntryFlags::PRESENT | EntryFlags::WRITABLE,
            );
        }
    }

    /// Drop every mapping of a dead process's directory.
    ///
    /// Caller must have interrupts disabled and must not be running on it.
    pub fn clear_process_directory(pid: usize) {
        // SAFETY: per the caller's contract.
        unsafe { PROCESS_DIRECTORIES.get_mut()[pid].clear() };
    }

    /// Map the caller's terminal video table at the fixed user virtual
    /// address and reload CR3 so the mapping is live.
    ///
    /// Caller must have interrupts disabled.
    pub fn map_vidmap(pid: usize, terminal: usize) {
        // SAFETY: per the caller's contract.
        unsafe {
            let table = &VIDEO_TABLES.get_mut()[terminal] as *const PageTable as u32;
            let dir = &mut PROCESS_DIRECTORIES.get_mut()[pid];
            dir.map_table(
                VIDMAP_VA,
                table,
                EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER,
            );
        }
        switch_to(pid);
    }

    /// Re-aim terminal `terminal`'s video page at `frame` (the physical
    /// buffer or a shadow). The caller reloads CR3 afterwards.
    ///
    /// Caller must have interrupts disabled.
    pub fn aim_video_page(terminal: usize, frame: u32) {
        // SAFETY: per the caller's contract.
        unsafe { VIDEO_TABLES.get_mut()[terminal].set_frame(VIDEO_PHYS, frame) };
    }

    /// Load process `pid`'s directory. Non-global translations flush.
    pub fn switch_to(pid: usize) {
        // SAFETY: the directory is statically allocated and fully built by
        // `build_process_directory`.
        unsafe { set_cr3(&PROCESS_DIRECTORIES.get_mut()[pid] as *const PageDirectory as u32) };
    }

    /// Load the kernel directory.
    pub fn switch_to_kernel() {
        // SAFETY: the kernel directory is static and built during `init`.
        unsafe { set_cr3(KERNEL_DIRECTORY.as_ptr() as u32) };
    }

    /// Whether `va` falls in a user-accessible page of the current process's
    /// directory. Called at the entry of every system call that accepts a
    /// pointer.
    pub fn is_user_addr(va: u32) -> bool {
        let Some(pid) = crate::process::current() else {
            return false;
        };
        // SAFETY: read-only walk; directories are static.
        let dir = unsafe { &PROCESS_DIRECTORIES.get_mut()[pid] };
        let pde = dir.entry(va);
        if !pde.is_present() || !pde.is_user() {
            return false;
        }
        if pde.is_large() {
            return true;
        }
        // SAFETY: a present non-large entry points at one of the static
        // video tables, identity-reachable from kernel space.
        let table = unsafe { &*(pde.frame() as *const PageTable) };
        let pte = table.entry(va);
        pte.is_present() && pte.is_user()
    }

    /// Turn on 4 MiB pages, global pages, and paging itself.
    unsafe fn enable_paging(directory: u32) {
        // SAFETY: the directory maps the currently executing kernel region
        // identity-style, so the instruction stream survives the switch.
        unsafe {
            asm!(
                "mov cr3, {dir}",
                // CR4.PSE (4 MiB pages) and CR4.PGE (global pages).
                "mov {tmp}, cr4",
                "or {tmp}, 0x90",
                "mov cr4, {tmp}",
                // CR0.PG | CR0.PE.
                "mov {tmp}, cr0",
                "or {tmp}, 0x80000001",
                "mov cr0, {tmp}",
                dir = in(reg) directory,
                tmp = out(reg) _,
                options(nostack),
            );
        }
    }

    /// Load CR3.
    unsafe fn set_cr3(directory: u32) {
        // SAFETY: the caller passes a valid page-directory physical address.
        unsafe {
            asm!("mov cr3, {}", in(reg) directory, options(nostack));
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use active::{
    aim_video_page, build_process_directory, clear_process_directory, init, is_user_addr,
    map_vidmap, switch_to, switch_to_kernel,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_frames_follow_the_kernel_region() {
        assert_eq!(image_frame(0), 0x0080_0000);
        assert_eq!(image_frame(1), 0x00C0_0000);
        assert_eq!(image_frame(7), 0x0240_0000);
    }

    #[test]
    fn shadow_frames_sit_above_the_physical_buffer() {
        assert_eq!(shadow_frame(0), 0xB9000);
        assert_eq!(shadow_frame(1), 0xBA000);
        assert_eq!(shadow_frame(2), 0xBB000);
    }

    #[test]
    fn vidmap_address_aliases_the_video_page_index() {
        // The vidmap slot must resolve to the same table index as the
        // kernel-side video page, so a single re-aim moves both views.
        assert_eq!(paging::table_index(VIDMAP_VA), paging::table_index(VIDEO_PHYS));
        assert_eq!(paging::directory_index(VIDMAP_VA), 33);
    }

    #[test]
    fn user_stack_is_the_last_dword_of_the_window() {
        assert_eq!(USER_STACK_TOP, 0x083F_FFFC);
        assert_eq!(MAX_IMAGE_BYTES, 0x3B8000);
    }
}
