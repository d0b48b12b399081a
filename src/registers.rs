//! Fixed lookup tables for converting human units into probe register values.

/// High-speed PLL clock feeding the ultrasound ADC.
pub const HSPLL_CLOCK_HZ: f64 = 80e6;

/// ADC oversampling rates supported by the capture engine.
pub const OVERSAMPLING_RATES: [u32; 5] = [10, 20, 40, 80, 160];

/// Sampling frequencies derived from [`OVERSAMPLING_RATES`] (80 MHz / rate).
pub const SAMPLING_FREQUENCIES_HZ: [f64; 5] = [
    HSPLL_CLOCK_HZ / 10.0,
    HSPLL_CLOCK_HZ / 20.0,
    HSPLL_CLOCK_HZ / 40.0,
    HSPLL_CLOCK_HZ / 80.0,
    HSPLL_CLOCK_HZ / 160.0,
];

/// Register code of the first entry in [`SAMPLING_FREQUENCIES_HZ`].
pub const SAMPLING_RATE_CODE_BASE: u16 = 0;

/// PGA receive gain steps in dB.
#[rustfmt::skip]
pub const PGA_GAINS_DB: [f64; 47] = [
    -6.5, -5.5, -4.6, -4.1, -3.3, -2.3, -1.4, -0.8,
     0.1,  1.0,  1.9,  2.6,  3.5,  4.4,  5.2,  6.0,
     6.8,  7.7,  8.7,  9.0,  9.8, 10.7, 11.7, 12.2,
    13.0, 13.9, 14.9, 15.5, 16.3, 17.2, 18.2, 18.8,
    19.6, 20.5, 21.5, 22.0, 22.8, 23.6, 24.6, 25.0,
    25.8, 26.7, 27.7, 28.1, 28.9, 29.8, 30.8,
];

/// Register code of the first entry in [`PGA_GAINS_DB`] (codes run 17..=63).
pub const PGA_GAIN_CODE_BASE: u16 = 17;

/// Microsecond to tick conversion factors, one per timing register.
pub mod ticks_per_us {
    /// LFXT cycles: 655 ticks = 20 ms, 65535 ticks = 2 s
    pub const DCDC_TURNON: f64 = 65535.0 / 2_000_000.0;
    pub const MEAS_PERIOD: f64 = 65535.0 / 2_000_000.0;
    /// 8 MHz timer
    pub const START_HVMUXRX: f64 = 8.0;
    /// HSPLL / 16
    pub const START_PPG: f64 = 5.0;
    pub const TURNON_ADC: f64 = 5.0;
    pub const START_PGAINBIAS: f64 = 5.0;
    pub const START_ADCSAMPL: f64 = 5.0;
    /// HSPLL / 256
    pub const RESTART_CAPT: f64 = 5.0 / 16.0;
    /// HSPLL / 64
    pub const CAPT_TIMEOUT: f64 = 5.0 / 4.0;
}

/// Sampling frequency produced by an oversampling rate, if the rate is supported.
pub fn sampling_frequency(oversampling_rate: u32) -> Option<f64> {
    OVERSAMPLING_RATES
        .iter()
        .position(|&rate| rate == oversampling_rate)
        .map(|idx| SAMPLING_FREQUENCIES_HZ[idx])
}

/// Converts microseconds into ticks, truncating towards zero.
pub fn us_to_ticks(us: u32, ticks_per_us: f64) -> f64 {
    (f64::from(us) * ticks_per_us).trunc()
}

/// Smallest whole number of microseconds that reaches `ticks`.
pub fn ticks_to_us(ticks: u64, ticks_per_us: f64) -> u64 {
    (ticks as f64 / ticks_per_us).ceil() as u64
}
