/// Status light of a sensor node. Purely cosmetic.
pub trait Indicator: Send {
    fn blink(&mut self, times: u8);
}

#[derive(Debug, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn blink(&mut self, _times: u8) {}
}

/// Stands in for an LED on hosts without one.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn blink(&mut self, times: u8) {
        tracing::trace!("indicator blink x{}", times);
    }
}
