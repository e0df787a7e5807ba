//! Best-effort process naming.
//!
//! Purely cosmetic: the pipeline renames itself per stage and workers name
//! themselves after their component so `ps`/`top` output is readable.
//! Silently does nothing on platforms without a supported mechanism.

/// Set the current process name, truncated to the platform limit
pub fn set_title(title: &str) {
    #[cfg(target_os = "linux")]
    {
        // The kernel caps comm at 15 bytes plus the terminating NUL
        let end = title
            .char_indices()
            .map(|(offset, c)| offset + c.len_utf8())
            .take_while(|end| *end <= 15)
            .last()
            .unwrap_or(0);
        let _ = std::fs::write("/proc/self/comm", &title.as_bytes()[..end]);
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = title;
    }
}
