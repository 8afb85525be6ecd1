/// Launch parameters for one orchestrated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings<'a> {
    binary: &'a str,
    probe_port: u16,
}

impl<'a> ServiceSettings<'a> {
    pub(crate) const fn new(binary: &'a str, probe_port: u16) -> Self {
        Self { binary, probe_port }
    }

    /// Executable to spawn.
    #[must_use]
    pub const fn binary(&self) -> &'a str {
        self.binary
    }

    /// Loopback port whose acceptance of connections marks readiness.
    #[must_use]
    pub const fn probe_port(&self) -> u16 {
        self.probe_port
    }
}
