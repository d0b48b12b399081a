// Configuration packet layout, as decoded by the probe firmware
use crate::config::{PACKAGE_LEN, START_BYTE_CONF_PACK, START_BYTE_RESTART, TX_RX_MAX_NUM_OF_CONFIGS};
use crate::error::{Error, Result};
use crate::registers::{
    PGA_GAIN_CODE_BASE, PGA_GAINS_DB, SAMPLING_FREQUENCIES_HZ, SAMPLING_RATE_CODE_BASE,
    ticks_per_us, ticks_to_us, us_to_ticks,
};

/// Fields carried by the configuration packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DcdcTurnon,
    MeasPeriod,
    TransFreq,
    PulseFreq,
    NumPulses,
    SamplingFreq,
    NumSamples,
    RxGain,
    NumTxRxConfigs,
    StartHvMuxRx,
    StartPpg,
    TurnOnAdc,
    StartPgaInBias,
    StartAdcSampl,
    RestartCapt,
    CaptTimeout,
}

/// Little-endian encoding width of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

impl Width {
    pub const fn len(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    fn write(self, out: &mut Vec<u8>, value: u64) {
        match self {
            Self::U8 => out.push(value as u8),
            Self::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            Self::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
        }
    }

    fn read(self, bytes: &[u8]) -> u64 {
        match self {
            Self::U8 => u64::from(bytes[0]),
            Self::U16 => u64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            Self::U32 => u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        }
    }
}

/// How a field value is checked before it is encoded.
#[derive(Debug, Clone, Copy)]
pub enum Limit {
    /// Inclusive range in register units.
    Range { min: u64, max: u64 },
    /// Exact membership; the index of the match plus `code_base` is encoded.
    List {
        allowed: &'static [f64],
        code_base: u16,
    },
}

/// Validation strictness applied while converting to registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Bounds of the descriptor table.
    #[default]
    Lenient,
    /// Additionally rejects zero for fields that carry a strict minimum.
    Strict,
}

/// Static description of one packet field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub field: Field,
    pub name: &'static str,
    pub label: &'static str,
    pub limit: Limit,
    /// Present for time fields given in microseconds.
    pub ticks_per_us: Option<f64>,
    pub width: Width,
    pub strict_min: Option<u64>,
}

const fn range(
    field: Field,
    name: &'static str,
    label: &'static str,
    min: u64,
    max: u64,
    width: Width,
) -> FieldDescriptor {
    FieldDescriptor {
        field,
        name,
        label,
        limit: Limit::Range { min, max },
        ticks_per_us: None,
        width,
        strict_min: None,
    }
}

const fn timing(
    field: Field,
    name: &'static str,
    label: &'static str,
    min: u64,
    factor: f64,
) -> FieldDescriptor {
    FieldDescriptor {
        field,
        name,
        label,
        limit: Limit::Range { min, max: 65535 },
        ticks_per_us: Some(factor),
        width: Width::U16,
        strict_min: None,
    }
}

const fn strict(mut descriptor: FieldDescriptor, min: u64) -> FieldDescriptor {
    descriptor.strict_min = Some(min);
    descriptor
}

/// Basic settings, in packet order, preceding the TX/RX table.
pub static BASIC_FIELDS: [FieldDescriptor; 9] = [
    strict(timing(Field::DcdcTurnon, "dcdc_turnon_time", "DC-DC turn on time [us]", 0, ticks_per_us::DCDC_TURNON), 1),
    timing(Field::MeasPeriod, "meas_period", "Acquisition period [us]", 655, ticks_per_us::MEAS_PERIOD),
    range(Field::TransFreq, "trans_freq", "Transmitter frequency [Hz]", 0, 5_000_000, Width::U32),
    range(Field::PulseFreq, "pulse_freq", "Pulse frequency [Hz]", 0, 5_000_000, Width::U32),
    range(Field::NumPulses, "num_pulses", "Number of pulses", 0, 30, Width::U8),
    FieldDescriptor {
        field: Field::SamplingFreq,
        name: "sampling_freq",
        label: "Sampling frequency [Hz]",
        limit: Limit::List {
            allowed: &SAMPLING_FREQUENCIES_HZ,
            code_base: SAMPLING_RATE_CODE_BASE,
        },
        ticks_per_us: None,
        width: Width::U16,
        strict_min: None,
    },
    strict(range(Field::NumSamples, "num_samples", "Number of samples", 0, 800, Width::U16), 1),
    FieldDescriptor {
        field: Field::RxGain,
        name: "rx_gain",
        label: "Receive (RX) gain [dB]",
        limit: Limit::List {
            allowed: &PGA_GAINS_DB,
            code_base: PGA_GAIN_CODE_BASE,
        },
        ticks_per_us: None,
        width: Width::U8,
        strict_min: None,
    },
    strict(
        range(Field::NumTxRxConfigs, "num_txrx_configs", "Number of TX/RX configs", 0, TX_RX_MAX_NUM_OF_CONFIGS as u64, Width::U8),
        1,
    ),
];

/// Advanced timing settings, in packet order, following the TX/RX table.
pub static ADVANCED_FIELDS: [FieldDescriptor; 7] = [
    timing(Field::StartHvMuxRx, "start_hvmuxrx", "HV-MUX RX start time [us]", 0, ticks_per_us::START_HVMUXRX),
    timing(Field::StartPpg, "start_ppg", "PPG start time [us]", 0, ticks_per_us::START_PPG),
    timing(Field::TurnOnAdc, "turnon_adc", "ADC turn on time [us]", 0, ticks_per_us::TURNON_ADC),
    timing(Field::StartPgaInBias, "start_pgainbias", "PGA in bias start time [us]", 0, ticks_per_us::START_PGAINBIAS),
    timing(Field::StartAdcSampl, "start_adcsampl", "ADC sampling start time [us]", 0, ticks_per_us::START_ADCSAMPL),
    timing(Field::RestartCapt, "restart_capt", "Capture restart time [us]", 0, ticks_per_us::RESTART_CAPT),
    timing(Field::CaptTimeout, "capt_timeout", "Capture timeout time [us]", 0, ticks_per_us::CAPT_TIMEOUT),
];

impl Field {
    /// Static descriptor of this field.
    pub fn descriptor(self) -> &'static FieldDescriptor {
        match self {
            Self::DcdcTurnon => &BASIC_FIELDS[0],
            Self::MeasPeriod => &BASIC_FIELDS[1],
            Self::TransFreq => &BASIC_FIELDS[2],
            Self::PulseFreq => &BASIC_FIELDS[3],
            Self::NumPulses => &BASIC_FIELDS[4],
            Self::SamplingFreq => &BASIC_FIELDS[5],
            Self::NumSamples => &BASIC_FIELDS[6],
            Self::RxGain => &BASIC_FIELDS[7],
            Self::NumTxRxConfigs => &BASIC_FIELDS[8],
            Self::StartHvMuxRx => &ADVANCED_FIELDS[0],
            Self::StartPpg => &ADVANCED_FIELDS[1],
            Self::TurnOnAdc => &ADVANCED_FIELDS[2],
            Self::StartPgaInBias => &ADVANCED_FIELDS[3],
            Self::StartAdcSampl => &ADVANCED_FIELDS[4],
            Self::RestartCapt => &ADVANCED_FIELDS[5],
            Self::CaptTimeout => &ADVANCED_FIELDS[6],
        }
    }
}

impl FieldDescriptor {
    /// Validates `value` (human units) and converts it to its register value.
    pub fn to_register(&self, value: f64, mode: ValidationMode) -> Result<u64> {
        match self.limit {
            Limit::Range { min, max } => {
                let min = match (mode, self.strict_min) {
                    (ValidationMode::Strict, Some(strict_min)) => strict_min.max(min),
                    _ => min,
                };
                let register = match self.ticks_per_us {
                    Some(factor) if value >= 0.0 && value <= f64::from(u32::MAX) => {
                        us_to_ticks(value as u32, factor)
                    }
                    Some(factor) => (value * factor).trunc(),
                    None => value,
                };
                if register.fract() != 0.0 || register < min as f64 || register > max as f64 {
                    return Err(self.out_of_range(value, register, min, max));
                }
                Ok(register as u64)
            }
            Limit::List { allowed, code_base } => allowed
                .iter()
                .position(|&candidate| candidate == value)
                .map(|idx| u64::from(code_base) + idx as u64)
                .ok_or_else(|| Error::out_of_range(self.name, value, format!("one of {allowed:?}"))),
        }
    }

    fn out_of_range(&self, value: f64, register: f64, min: u64, max: u64) -> Error {
        match self.ticks_per_us {
            Some(factor) => Error::out_of_range(
                self.name,
                format!("{value} us ({register} ticks)"),
                format!(
                    "[{min}, {max}] ticks, about [{}, {}] us",
                    ticks_to_us(min, factor),
                    (max as f64 / factor).floor()
                ),
            ),
            None => Error::out_of_range(self.name, value, format!("[{min}, {max}]")),
        }
    }
}

/// Register values of one configuration packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registers {
    /// Values of [`BASIC_FIELDS`], in order.
    pub basic: Vec<u64>,
    pub tx_configs: Vec<u16>,
    pub rx_configs: Vec<u16>,
    /// Values of [`ADVANCED_FIELDS`], in order.
    pub advanced: Vec<u64>,
}

impl Registers {
    /// Register value of a field.
    pub fn get(&self, field: Field) -> Option<u64> {
        if let Some(idx) = BASIC_FIELDS.iter().position(|d| d.field == field) {
            return self.basic.get(idx).copied();
        }
        ADVANCED_FIELDS
            .iter()
            .position(|d| d.field == field)
            .and_then(|idx| self.advanced.get(idx).copied())
    }

    /// Number of bytes the packet takes before zero padding.
    pub fn encoded_len(&self) -> usize {
        let basic: usize = BASIC_FIELDS.iter().map(|d| d.width.len()).sum();
        let advanced: usize = ADVANCED_FIELDS.iter().map(|d| d.width.len()).sum();
        1 + basic + 4 * self.tx_configs.len() + advanced
    }

    /// Encodes the configuration packet, zero padded to [`PACKAGE_LEN`].
    pub fn to_packet(&self) -> Result<Vec<u8>> {
        if self.basic.len() != BASIC_FIELDS.len() || self.advanced.len() != ADVANCED_FIELDS.len() {
            return Err(Error::malformed_packet(format!(
                "expected {} basic and {} advanced registers, got {} and {}",
                BASIC_FIELDS.len(),
                ADVANCED_FIELDS.len(),
                self.basic.len(),
                self.advanced.len()
            )));
        }
        if self.tx_configs.len() != self.rx_configs.len() {
            return Err(Error::ConfigMismatch {
                table: "rx_configs",
                len: self.rx_configs.len(),
                expected: self.tx_configs.len(),
            });
        }
        let len = self.encoded_len();
        if len > PACKAGE_LEN {
            return Err(Error::PacketOverflow {
                len,
                max: PACKAGE_LEN,
            });
        }

        let mut packet = Vec::with_capacity(PACKAGE_LEN);
        packet.push(START_BYTE_CONF_PACK);
        for (descriptor, &value) in BASIC_FIELDS.iter().zip(&self.basic) {
            descriptor.width.write(&mut packet, value);
        }
        for (tx, rx) in self.tx_configs.iter().zip(&self.rx_configs) {
            packet.extend_from_slice(&tx.to_le_bytes());
            packet.extend_from_slice(&rx.to_le_bytes());
        }
        for (descriptor, &value) in ADVANCED_FIELDS.iter().zip(&self.advanced) {
            descriptor.width.write(&mut packet, value);
        }
        packet.resize(PACKAGE_LEN, 0);
        Ok(packet)
    }

    /// Decodes a configuration packet the same way the probe does.
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() != PACKAGE_LEN {
            return Err(Error::malformed_packet(format!(
                "expected {PACKAGE_LEN} bytes, got {}",
                packet.len()
            )));
        }
        if packet[0] != START_BYTE_CONF_PACK {
            return Err(Error::malformed_packet(format!(
                "unexpected start byte {}",
                packet[0]
            )));
        }

        let mut offset = 1;
        let mut basic = Vec::with_capacity(BASIC_FIELDS.len());
        for descriptor in &BASIC_FIELDS {
            basic.push(descriptor.width.read(&packet[offset..]));
            offset += descriptor.width.len();
        }

        let count = basic[BASIC_FIELDS.len() - 1] as usize;
        if count > TX_RX_MAX_NUM_OF_CONFIGS {
            return Err(Error::malformed_packet(format!(
                "{count} TX/RX configs exceed the maximum of {TX_RX_MAX_NUM_OF_CONFIGS}"
            )));
        }
        let advanced_len: usize = ADVANCED_FIELDS.iter().map(|d| d.width.len()).sum();
        if offset + 4 * count + advanced_len > PACKAGE_LEN {
            return Err(Error::malformed_packet(format!(
                "{count} TX/RX configs do not fit into {PACKAGE_LEN} bytes"
            )));
        }

        let mut registers = Self {
            basic,
            tx_configs: Vec::with_capacity(count),
            rx_configs: Vec::with_capacity(count),
            advanced: Vec::with_capacity(ADVANCED_FIELDS.len()),
        };
        for _ in 0..count {
            registers.tx_configs.push(u16::from_le_bytes([packet[offset], packet[offset + 1]]));
            registers.rx_configs.push(u16::from_le_bytes([packet[offset + 2], packet[offset + 3]]));
            offset += 4;
        }
        for descriptor in &ADVANCED_FIELDS {
            registers.advanced.push(descriptor.width.read(&packet[offset..]));
            offset += descriptor.width.len();
        }
        Ok(registers)
    }
}

/// Restart packet: returns the probe to idle.
pub fn restart_packet() -> Vec<u8> {
    let mut packet = vec![0u8; PACKAGE_LEN];
    packet[0] = START_BYTE_RESTART;
    packet
}
