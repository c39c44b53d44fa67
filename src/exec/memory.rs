/// Tracks peak resident memory of this process and its finished children.
///
/// The figure is a high-water mark for the whole process, so with several jobs
/// running on threads it bounds every job's usage rather than measuring one.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTracker {
    peak: Option<f64>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the current peak.
    pub fn record(&mut self) {
        let total = max_rss(libc::RUSAGE_SELF) + max_rss(libc::RUSAGE_CHILDREN);
        self.peak = Some(to_gb(total));
    }

    /// Peak memory in GB, rounded to two decimals, if recorded.
    pub fn peak(&self) -> Option<f64> {
        self.peak
    }
}

// linux reports ru_maxrss in kilobytes, macos in bytes.
#[cfg(target_os = "macos")]
const RSS_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
#[cfg(not(target_os = "macos"))]
const RSS_PER_GB: f64 = 1024.0 * 1024.0;

fn to_gb(rss: i64) -> f64 {
    (rss as f64 / RSS_PER_GB * 100.0).round() / 100.0
}

fn max_rss(who: libc::c_int) -> i64 {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the struct we pass it.
    let ret = unsafe { libc::getrusage(who, usage.as_mut_ptr()) };
    if ret != 0 {
        log::warn!("getrusage failed: {}", std::io::Error::last_os_error());
        return 0;
    }
    // SAFETY: initialized by the successful call above.
    let usage = unsafe { usage.assume_init() };
    usage.ru_maxrss as i64
}
