use derive_getters::Getters;
use can_core::{ChannelConfig, ChannelState, error::CanError};
use crate::constant::{CHANNEL_COUNT, DEFAULT_ACC_CODE, DEFAULT_ACC_MASK};

/// Acceptance filter layout, as the vendor tool names it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FilterType {
    Dual = 0,
    #[default]
    Single = 1,
}

impl TryFrom<u8> for FilterType {
    type Error = CanError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FilterType::Dual),
            1 => Ok(FilterType::Single),
            _ => Err(CanError::configuration_error(format!("filter type: {} not supported", value))),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ChannelMode {
    #[default]
    Normal = 0,
    /// Firmware behaviour is unverified, it has been seen to hang the device.
    ListenOnly = 1,
}

impl TryFrom<u8> for ChannelMode {
    type Error = CanError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChannelMode::Normal),
            1 => Ok(ChannelMode::ListenOnly),
            _ => Err(CanError::configuration_error(format!("channel mode: {} not supported", value))),
        }
    }
}

/// Options sent along with the bit timing in the init command.
///
/// The acceptance code/mask semantics of the firmware are not characterised,
/// the values are passed through untouched. The defaults are what the vendor
/// tool sends and let every frame through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Getters)]
pub struct InitOptions {
    #[getter(copy)]
    acc_code: u32,
    #[getter(copy)]
    acc_mask: u32,
    #[getter(copy)]
    filter: FilterType,
    #[getter(copy)]
    mode: ChannelMode,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            acc_code: DEFAULT_ACC_CODE,
            acc_mask: DEFAULT_ACC_MASK,
            filter: Default::default(),
            mode: Default::default(),
        }
    }
}

impl InitOptions {
    pub fn set_acc_code(&mut self, acc_code: u32) -> &mut Self {
        self.acc_code = acc_code;
        self
    }

    pub fn set_acc_mask(&mut self, acc_mask: u32) -> &mut Self {
        self.acc_mask = acc_mask;
        self
    }

    pub fn set_filter(&mut self, filter: FilterType) -> &mut Self {
        self.filter = filter;
        self
    }

    pub fn set_mode(&mut self, mode: ChannelMode) -> &mut Self {
        self.mode = mode;
        self
    }
}

impl TryFrom<&ChannelConfig> for InitOptions {
    type Error = CanError;
    fn try_from(cfg: &ChannelConfig) -> Result<Self, Self::Error> {
        let mut options = Self::default();
        if let Some(v) = cfg.acc_code() {
            options.set_acc_code(v);
        }
        if let Some(v) = cfg.acc_mask() {
            options.set_acc_mask(v);
        }
        if let Some(v) = cfg.filter() {
            options.set_filter(FilterType::try_from(v)?);
        }
        if let Some(v) = cfg.mode() {
            options.set_mode(ChannelMode::try_from(v)?);
        }

        Ok(options)
    }
}

/// Operations gated by the channel state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Operation {
    Init,
    Start,
    Stop,
    Send,
    Receive,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Send => "send",
            Self::Receive => "receive",
        }
    }
}

/// Lifecycle of both channels of one device.
///
/// `init` is accepted in every state and always lands in `Initialized`,
/// `start` needs a prior init, `stop` a started channel. The last init
/// stays in effect across stop/start.
#[derive(Debug, Default, Clone)]
pub(crate) struct Channels {
    states: [ChannelState; CHANNEL_COUNT as usize],
}

impl Channels {
    #[inline]
    pub(crate) fn state(&self, channel: u8) -> Result<ChannelState, CanError> {
        Ok(self.states[index(channel)?])
    }

    /// Fails with `StateError` when `operation` isn't legal on `channel` now.
    pub(crate) fn check(&self, channel: u8, operation: Operation) -> Result<(), CanError> {
        let state = self.state(channel)?;
        let legal = match operation {
            Operation::Init => true,
            Operation::Start => matches!(state, ChannelState::Initialized | ChannelState::Stopped),
            Operation::Stop
            | Operation::Send
            | Operation::Receive => state == ChannelState::Started,
        };

        if legal {
            Ok(())
        }
        else {
            Err(CanError::StateError { channel, state, operation: operation.name() })
        }
    }

    /// Record a completed operation, the transfer must have succeeded already.
    pub(crate) fn transit(&mut self, channel: u8, operation: Operation) -> Result<ChannelState, CanError> {
        self.check(channel, operation)?;
        let idx = index(channel)?;
        let state = match operation {
            Operation::Init => ChannelState::Initialized,
            Operation::Start => ChannelState::Started,
            Operation::Stop => ChannelState::Stopped,
            Operation::Send | Operation::Receive => self.states[idx],
        };
        log::debug!("CANALYST-II - channel: {} {} -> {}", channel, self.states[idx], state);
        self.states[idx] = state;

        Ok(state)
    }

    pub(crate) fn started(&self) -> Vec<u8> {
        (0..CHANNEL_COUNT)
            .filter(|&c| self.states[c as usize] == ChannelState::Started)
            .collect()
    }
}

#[inline]
pub(crate) fn index(channel: u8) -> Result<usize, CanError> {
    if channel < CHANNEL_COUNT {
        Ok(channel as usize)
    }
    else {
        Err(CanError::validation_error(format!("channel: {} is not one of 0, 1", channel)))
    }
}

#[cfg(test)]
mod tests {
    use can_core::{ChannelConfig, ChannelState, error::CanError};
    use super::{ChannelMode, Channels, FilterType, InitOptions, Operation};

    #[test]
    fn lifecycle() -> anyhow::Result<()> {
        let mut channels = Channels::default();
        assert_eq!(channels.state(0)?, ChannelState::Uninitialized);

        for op in [Operation::Start, Operation::Stop, Operation::Send, Operation::Receive] {
            assert!(matches!(
                channels.check(0, op),
                Err(CanError::StateError { channel: 0, state: ChannelState::Uninitialized, .. })
            ));
        }

        assert_eq!(channels.transit(0, Operation::Init)?, ChannelState::Initialized);
        assert!(channels.check(0, Operation::Send).is_err());
        assert_eq!(channels.transit(0, Operation::Start)?, ChannelState::Started);
        channels.check(0, Operation::Send)?;
        channels.check(0, Operation::Receive)?;
        assert!(channels.check(0, Operation::Start).is_err());
        assert_eq!(channels.started(), vec![0]);

        assert_eq!(channels.transit(0, Operation::Stop)?, ChannelState::Stopped);
        assert!(channels.check(0, Operation::Stop).is_err());
        assert!(channels.check(0, Operation::Receive).is_err());
        assert_eq!(channels.transit(0, Operation::Start)?, ChannelState::Started);

        // re-init from started
        assert_eq!(channels.transit(0, Operation::Init)?, ChannelState::Initialized);
        assert!(channels.check(0, Operation::Send).is_err());

        assert_eq!(channels.state(1)?, ChannelState::Uninitialized);
        assert!(matches!(channels.state(2), Err(CanError::ValidationError(_))));

        Ok(())
    }

    #[test]
    fn options() -> anyhow::Result<()> {
        let options = InitOptions::default();
        assert_eq!(options.acc_code(), 0x1);
        assert_eq!(options.acc_mask(), 0xFFFF_FFFF);
        assert_eq!(options.filter(), FilterType::Single);
        assert_eq!(options.mode(), ChannelMode::Normal);

        let mut cfg = ChannelConfig::new(250_000);
        cfg.set_acc_code(0x10)
            .set_filter(0)
            .set_mode(1);
        let options = InitOptions::try_from(&cfg)?;
        assert_eq!(options.acc_code(), 0x10);
        assert_eq!(options.acc_mask(), 0xFFFF_FFFF);
        assert_eq!(options.filter(), FilterType::Dual);
        assert_eq!(options.mode(), ChannelMode::ListenOnly);

        cfg.set_filter(7);
        assert!(matches!(InitOptions::try_from(&cfg), Err(CanError::ConfigurationError(_))));

        Ok(())
    }
}
