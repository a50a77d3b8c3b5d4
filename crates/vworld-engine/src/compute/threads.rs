use super::error::ComputeError;

/// Thread-group sizing shared by host code and shader source.
///
/// `threads_per_group` is baked into the generated source through the
/// `threadCountX/Y/Z` tags; `thread_groups` is what the host passes to the
/// dispatch call. Their product is the number of invocations per axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ThreadGroupConfig {
    threads_per_group: [u32; 3],
    thread_groups: [u32; 3],
}

impl ThreadGroupConfig {
    /// Fails if any threads-per-group component is zero.
    pub fn new(threads_per_group: [u32; 3], thread_groups: [u32; 3]) -> Result<Self, ComputeError> {
        if threads_per_group.contains(&0) {
            return Err(ComputeError::invalid(format!(
                "threads per group must be positive, got {threads_per_group:?}"
            )));
        }

        Ok(Self {
            threads_per_group,
            thread_groups,
        })
    }

    /// Picks the smallest group counts whose coverage reaches `extent` on every axis.
    pub fn covering(extent: [u32; 3], threads_per_group: [u32; 3]) -> Result<Self, ComputeError> {
        if threads_per_group.contains(&0) {
            return Err(ComputeError::invalid(format!(
                "threads per group must be positive, got {threads_per_group:?}"
            )));
        }

        let groups = [
            extent[0].div_ceil(threads_per_group[0]),
            extent[1].div_ceil(threads_per_group[1]),
            extent[2].div_ceil(threads_per_group[2]),
        ];
        Self::new(threads_per_group, groups)
    }

    #[inline]
    pub fn threads_per_group(&self) -> [u32; 3] {
        self.threads_per_group
    }

    #[inline]
    pub fn thread_groups(&self) -> [u32; 3] {
        self.thread_groups
    }

    /// Invocations launched along each axis.
    pub fn coverage(&self) -> [u64; 3] {
        let t = self.threads_per_group;
        let g = self.thread_groups;
        [
            t[0] as u64 * g[0] as u64,
            t[1] as u64 * g[1] as u64,
            t[2] as u64 * g[2] as u64,
        ]
    }

    /// True when the dispatch lands exactly on `extent` with no remainder.
    pub fn covers_exactly(&self, extent: [u32; 3]) -> bool {
        self.coverage() == extent.map(u64::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_per_group_is_invalid() {
        assert!(ThreadGroupConfig::new([8, 0, 1], [1, 1, 1]).is_err());
        assert!(ThreadGroupConfig::covering([16, 16, 1], [0, 8, 1]).is_err());
    }

    #[test]
    fn zero_groups_is_allowed() {
        let cfg = ThreadGroupConfig::new([8, 8, 1], [0, 0, 0]).unwrap();
        assert_eq!(cfg.coverage(), [0, 0, 0]);
    }

    #[test]
    fn square_surface_is_covered_exactly() {
        let cfg = ThreadGroupConfig::covering([1080, 1080, 1], [8, 8, 1]).unwrap();
        assert_eq!(cfg.thread_groups(), [135, 135, 1]);
        assert!(cfg.covers_exactly([1080, 1080, 1]));
    }

    #[test]
    fn ragged_surface_rounds_up() {
        let cfg = ThreadGroupConfig::covering([1000, 30, 1], [16, 16, 1]).unwrap();
        assert_eq!(cfg.thread_groups(), [63, 2, 1]);
        assert_eq!(cfg.coverage(), [1008, 32, 1]);
        assert!(!cfg.covers_exactly([1000, 30, 1]));
    }
}
