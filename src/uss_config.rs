use serde::{Deserialize, Serialize};

use crate::config::MAX_NUM_ACQUISITIONS;
use crate::error::{Error, Result};
use crate::protocol::{self, ADVANCED_FIELDS, BASIC_FIELDS, Field, Registers, ValidationMode};
use crate::registers::{PGA_GAINS_DB, SAMPLING_FREQUENCIES_HZ, sampling_frequency};
use crate::routing::RoutingTable;

/// Parameters of one acquisition session, in human units.
///
/// Time fields are microseconds, frequencies are Hz and `rx_gain` is dB.
/// Conversion to register units happens in [`AcquisitionConfig::to_registers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub num_acquisitions: u32,

    // Basic settings
    pub dcdc_turnon_time: u32,
    pub meas_period: u32,
    pub trans_freq: u32,
    pub pulse_freq: u32,
    pub num_pulses: u32,
    pub sampling_freq: f64,
    pub num_samples: u32,
    pub rx_gain: f64,
    pub num_txrx_configs: u32,

    // TX/RX routing, owned by the routing document
    #[serde(skip)]
    pub tx_configs: Vec<u16>,
    #[serde(skip)]
    pub rx_configs: Vec<u16>,

    // Advanced settings
    pub start_hvmuxrx: u32,
    pub start_ppg: u32,
    pub turnon_adc: u32,
    pub start_pgainbias: u32,
    pub start_adcsampl: u32,
    pub restart_capt: u32,
    pub capt_timeout: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            num_acquisitions: 1000,
            dcdc_turnon_time: 30_520,
            meas_period: 40_000,
            trans_freq: 2_250_000,
            pulse_freq: 2_250_000,
            num_pulses: 2,
            sampling_freq: SAMPLING_FREQUENCIES_HZ[0],
            num_samples: 400,
            rx_gain: PGA_GAINS_DB[26],
            num_txrx_configs: 1,
            tx_configs: vec![0],
            rx_configs: vec![0],
            start_hvmuxrx: 500,
            start_ppg: 500,
            turnon_adc: 5,
            start_pgainbias: 5,
            start_adcsampl: 503,
            restart_capt: 3000,
            capt_timeout: 3000,
        }
    }
}

impl AcquisitionConfig {
    /// Value of a packet field in human units.
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::DcdcTurnon => f64::from(self.dcdc_turnon_time),
            Field::MeasPeriod => f64::from(self.meas_period),
            Field::TransFreq => f64::from(self.trans_freq),
            Field::PulseFreq => f64::from(self.pulse_freq),
            Field::NumPulses => f64::from(self.num_pulses),
            Field::SamplingFreq => self.sampling_freq,
            Field::NumSamples => f64::from(self.num_samples),
            Field::RxGain => self.rx_gain,
            Field::NumTxRxConfigs => f64::from(self.num_txrx_configs),
            Field::StartHvMuxRx => f64::from(self.start_hvmuxrx),
            Field::StartPpg => f64::from(self.start_ppg),
            Field::TurnOnAdc => f64::from(self.turnon_adc),
            Field::StartPgaInBias => f64::from(self.start_pgainbias),
            Field::StartAdcSampl => f64::from(self.start_adcsampl),
            Field::RestartCapt => f64::from(self.restart_capt),
            Field::CaptTimeout => f64::from(self.capt_timeout),
        }
    }

    /// Selects the sampling frequency produced by an ADC oversampling rate.
    pub fn set_oversampling_rate(&mut self, rate: u32) -> Result<()> {
        self.sampling_freq = sampling_frequency(rate).ok_or_else(|| {
            Error::out_of_range("oversampling_rate", rate, "one of [10, 20, 40, 80, 160]")
        })?;
        Ok(())
    }

    /// Copies the masks of a routing table into this configuration.
    pub fn apply_routing(&mut self, routing: &RoutingTable) {
        self.tx_configs = routing.tx_configs().to_vec();
        self.rx_configs = routing.rx_configs().to_vec();
        self.num_txrx_configs = routing.len() as u32;
    }

    /// Validates every field and converts it to register units.
    ///
    /// Fails on the first field that does not pass, in packet order.
    pub fn to_registers(&self, mode: ValidationMode) -> Result<Registers> {
        let basic = BASIC_FIELDS
            .iter()
            .map(|descriptor| descriptor.to_register(self.value(descriptor.field), mode))
            .collect::<Result<Vec<_>>>()?;

        let expected = self.num_txrx_configs as usize;
        if self.tx_configs.len() != expected {
            return Err(Error::ConfigMismatch {
                table: "tx_configs",
                len: self.tx_configs.len(),
                expected,
            });
        }
        if self.rx_configs.len() != expected {
            return Err(Error::ConfigMismatch {
                table: "rx_configs",
                len: self.rx_configs.len(),
                expected,
            });
        }

        let advanced = ADVANCED_FIELDS
            .iter()
            .map(|descriptor| descriptor.to_register(self.value(descriptor.field), mode))
            .collect::<Result<Vec<_>>>()?;

        Ok(Registers {
            basic,
            tx_configs: self.tx_configs.clone(),
            rx_configs: self.rx_configs.clone(),
            advanced,
        })
    }

    /// Validates the whole session, including fields that are not sent to the probe.
    pub fn validate(&self, mode: ValidationMode) -> Result<()> {
        if self.num_acquisitions > MAX_NUM_ACQUISITIONS {
            return Err(Error::out_of_range(
                "num_acquisitions",
                self.num_acquisitions,
                format!("[0, {MAX_NUM_ACQUISITIONS}]"),
            ));
        }
        self.to_registers(mode)?.to_packet().map(|_| ())
    }

    /// Encodes the configuration packet with the descriptor table bounds.
    pub fn build_packet(&self) -> Result<Vec<u8>> {
        self.build_packet_with(ValidationMode::Lenient)
    }

    pub fn build_packet_with(&self, mode: ValidationMode) -> Result<Vec<u8>> {
        self.to_registers(mode)?.to_packet()
    }

    /// Encodes the packet that returns the probe to idle.
    pub fn build_restart_packet(&self) -> Vec<u8> {
        protocol::restart_packet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PACKAGE_LEN, START_BYTE_CONF_PACK, START_BYTE_RESTART};

    fn assert_out_of_range(config: &AcquisitionConfig, expected: &str) {
        match config.build_packet() {
            Err(Error::ConfigOutOfRange { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected {expected} to be rejected, got {other:?}"),
        }
    }

    #[test]
    fn default_config_encodes_device_defaults() {
        let config = AcquisitionConfig::default();
        let packet = config.build_packet().unwrap();
        assert_eq!(packet.len(), PACKAGE_LEN);
        assert_eq!(packet[0], START_BYTE_CONF_PACK);

        let registers = Registers::parse(&packet).unwrap();
        assert_eq!(registers.get(Field::DcdcTurnon), Some(1000));
        assert_eq!(registers.get(Field::MeasPeriod), Some(1310));
        assert_eq!(registers.get(Field::SamplingFreq), Some(0));
        assert_eq!(registers.get(Field::RxGain), Some(43));
        assert_eq!(registers.get(Field::StartHvMuxRx), Some(4000));
        assert_eq!(registers.get(Field::StartPpg), Some(2500));
        assert_eq!(registers.get(Field::StartAdcSampl), Some(2515));
        assert_eq!(registers.get(Field::RestartCapt), Some(937));
        assert_eq!(registers.get(Field::CaptTimeout), Some(3750));
    }

    #[test]
    fn packet_round_trips_through_register_view() {
        let mut routing = RoutingTable::new();
        routing.add_config(&[0, 1], &[1, 2], false).unwrap();
        routing.add_config(&[7], &[6, 7], true).unwrap();

        let mut config = AcquisitionConfig::default();
        config.apply_routing(&routing);
        config.rx_gain = -6.5;
        config.set_oversampling_rate(160).unwrap();

        let registers = config.to_registers(ValidationMode::Strict).unwrap();
        let parsed = Registers::parse(&config.build_packet().unwrap()).unwrap();
        assert_eq!(parsed, registers);
        assert_eq!(parsed.get(Field::SamplingFreq), Some(4));
        assert_eq!(parsed.get(Field::RxGain), Some(17));
        assert_eq!(parsed.tx_configs, routing.tx_configs());
    }

    #[test]
    fn restart_packet_is_start_byte_and_zeros() {
        let packet = AcquisitionConfig::default().build_restart_packet();
        assert_eq!(packet.len(), PACKAGE_LEN);
        assert_eq!(packet[0], START_BYTE_RESTART);
        assert!(packet[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn limit_fields_accept_bounds_and_reject_beyond() {
        let mut config = AcquisitionConfig::default();
        config.num_pulses = 30;
        config.trans_freq = 5_000_000;
        config.num_samples = 800;
        assert!(config.build_packet().is_ok());

        config.num_pulses = 31;
        assert_out_of_range(&config, "num_pulses");

        config.num_pulses = 0;
        config.num_samples = 801;
        assert_out_of_range(&config, "num_samples");

        config.num_samples = 0;
        config.pulse_freq = 5_000_001;
        assert_out_of_range(&config, "pulse_freq");
    }

    #[test]
    fn time_fields_are_checked_in_ticks() {
        let mut config = AcquisitionConfig::default();

        // 20 ms is the shortest period, 2 s the longest
        config.meas_period = 20_000;
        assert!(config.build_packet().is_ok());
        config.meas_period = 19_987;
        assert_out_of_range(&config, "meas_period");
        config.meas_period = 2_000_000;
        assert!(config.build_packet().is_ok());
        config.meas_period = 2_000_050;
        assert_out_of_range(&config, "meas_period");

        config.meas_period = 40_000;
        config.start_ppg = 13_107;
        assert!(config.build_packet().is_ok());
        config.start_ppg = 13_108;
        assert_out_of_range(&config, "start_ppg");
    }

    #[test]
    fn list_fields_require_exact_table_entries() {
        let mut config = AcquisitionConfig::default();
        for (idx, &gain) in PGA_GAINS_DB.iter().enumerate() {
            config.rx_gain = gain;
            let registers = config.to_registers(ValidationMode::Lenient).unwrap();
            assert_eq!(registers.get(Field::RxGain), Some(17 + idx as u64));
        }
        config.rx_gain = 14.0;
        assert_out_of_range(&config, "rx_gain");

        config.rx_gain = 30.8;
        config.sampling_freq = 3e6;
        assert_out_of_range(&config, "sampling_freq");
        assert!(config.set_oversampling_rate(30).is_err());
    }

    #[test]
    fn strict_mode_rejects_empty_captures() {
        let mut config = AcquisitionConfig::default();
        config.num_samples = 0;
        assert!(config.build_packet().is_ok());
        assert!(matches!(
            config.build_packet_with(ValidationMode::Strict),
            Err(Error::ConfigOutOfRange { field: "num_samples", .. })
        ));
    }

    #[test]
    fn routing_length_must_match_declared_count() {
        let mut config = AcquisitionConfig::default();
        config.num_txrx_configs = 2;
        assert!(matches!(
            config.build_packet(),
            Err(Error::ConfigMismatch { table: "tx_configs", len: 1, expected: 2 })
        ));

        config.num_txrx_configs = 1;
        config.rx_configs.clear();
        assert!(matches!(
            config.build_packet(),
            Err(Error::ConfigMismatch { table: "rx_configs", len: 0, expected: 1 })
        ));
    }

    #[test]
    fn num_acquisitions_is_checked_by_validate() {
        let mut config = AcquisitionConfig::default();
        config.num_acquisitions = MAX_NUM_ACQUISITIONS;
        assert!(config.validate(ValidationMode::Strict).is_ok());
        config.num_acquisitions = MAX_NUM_ACQUISITIONS + 1;
        assert!(config.validate(ValidationMode::Lenient).is_err());
    }

    #[test]
    fn persisted_document_is_flat_and_fills_missing_keys() {
        let config = AcquisitionConfig {
            num_pulses: 5,
            ..AcquisitionConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["num_pulses"], 5);
        assert!(json.get("tx_configs").is_none());

        let loaded: AcquisitionConfig = serde_json::from_str(r#"{"num_pulses": 7}"#).unwrap();
        assert_eq!(loaded.num_pulses, 7);
        assert_eq!(loaded.meas_period, AcquisitionConfig::default().meas_period);
    }

    #[test]
    fn remaining_limits_reject_one_past_the_maximum() {
        let mut config = AcquisitionConfig::default();
        config.trans_freq = 5_000_001;
        assert_out_of_range(&config, "trans_freq");

        config.trans_freq = 2_250_000;
        config.restart_capt = 209_715;
        config.capt_timeout = 52_428;
        assert!(config.build_packet().is_ok());
        config.restart_capt = 209_716;
        assert_out_of_range(&config, "restart_capt");
        config.restart_capt = 3000;
        config.capt_timeout = 52_429;
        assert_out_of_range(&config, "capt_timeout");
    }

    #[test]
    fn config_count_is_range_checked_before_table_lengths() {
        let mut config = AcquisitionConfig::default();
        config.num_txrx_configs = 17;
        assert_out_of_range(&config, "num_txrx_configs");
    }

    #[test]
    fn nine_routing_entries_overflow_the_packet() {
        let mut routing = RoutingTable::new();
        for ch in 0..9u8 {
            routing.add_config(&[ch % 8], &[ch % 8], false).unwrap();
        }
        let mut config = AcquisitionConfig::default();
        config.apply_routing(&routing);

        assert!(matches!(
            config.build_packet(),
            Err(Error::PacketOverflow { len: 70, max: PACKAGE_LEN })
        ));
        routing = RoutingTable::from_entries(&routing.entries()[..8]).unwrap();
        config.apply_routing(&routing);
        assert_eq!(config.build_packet().unwrap().len(), PACKAGE_LEN);
    }
}
