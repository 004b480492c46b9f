use std::fmt::{self, Display, Formatter};

/// Columns written before the per-domain rates.
pub const HEADER_PREFIX: [&str; 6] = [
    "Benchmark",
    "Kernel",
    "FreqMode",
    "Timestamp",
    "Freq",
    "BinPolicy",
];

/// Join the fields with commas, without a trailing one.
fn csv_line<I, T>(fields: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Display,
{
    // this leaves the string with a trailing comma...
    let mut line: String = fields
        .into_iter()
        .map(|field| field.to_string() + ",")
        .collect();

    // remove the extra comma
    line.pop();
    line
}

/// Header row: the fixed prefix then one column per domain, in domain order.
pub fn header<'a>(domain_names: impl IntoIterator<Item = &'a str>) -> String {
    csv_line(HEADER_PREFIX.into_iter().chain(domain_names))
}

/// One data row of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    pub benchmark: &'a str,
    pub kernel: &'a str,
    pub freq_mode: i64,
    pub tick: u64,
    pub freq: u64,
    pub bin_policy: i64,
    /// One rate per domain, same order as the header
    pub rates: &'a [f64],
}

impl Display for Record<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let prefix = csv_line([
            self.benchmark.to_owned(),
            self.kernel.to_owned(),
            self.freq_mode.to_string(),
            self.tick.to_string(),
            self.freq.to_string(),
            self.bin_policy.to_string(),
        ]);
        if self.rates.is_empty() {
            write!(f, "{prefix}")
        } else {
            write!(f, "{prefix},{}", csv_line(self.rates))
        }
    }
}
