//! Bitrate to SJA1000 style `BTR0`/`BTR1` register conversion.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use derive_getters::Getters;
use can_core::error::CanError;
use crate::constant::CAN_CLOCK;

pub(crate) const BRP_MAX: u8 = 64;
pub(crate) const TSEG1_MAX: u8 = 16;
pub(crate) const TSEG2_MAX: u8 = 8;
pub(crate) const SJW_MAX: u8 = 4;
/// Shortest bit accepted by the search.
const TIME_QUANTA_MIN: u32 = 8;

/// Searched timings must hit the bitrate within 1/1000.
const TOLERANCE_DIVISOR: u64 = 1_000;
/// Legal sample point window, in per mille.
const SAMPLE_POINT_MIN: u32 = 500;
const SAMPLE_POINT_MAX: u32 = 900;
/// Preferred sample point window, in per mille.
const SAMPLE_POINT_LOW: u32 = 750;
const SAMPLE_POINT_HIGH: u32 = 875;

/// Timings used by the vendor tool, as `(bitrate, BTR0, BTR1)`.
pub const BITRATE_TABLE: &[(u32, u8, u8)] = &[
    (5_000, 0xBF, 0xFF),
    (10_000, 0x31, 0x1C),
    (20_000, 0x18, 0x1C),
    (33_330, 0x09, 0x6F),
    (40_000, 0x87, 0xFF),
    (50_000, 0x09, 0x1C),
    (66_660, 0x04, 0x6F),
    (80_000, 0x83, 0xFF),
    (83_330, 0x03, 0x6F),
    (100_000, 0x04, 0x1C),
    (125_000, 0x03, 0x1C),
    (200_000, 0x81, 0xFA),
    (250_000, 0x01, 0x1C),
    (400_000, 0x80, 0xFA),
    (500_000, 0x00, 0x1C),
    (666_000, 0x80, 0xB6),
    (800_000, 0x00, 0x16),
    (1_000_000, 0x00, 0x14),
];

/// Bit timing of one channel.
///
/// A bit lasts `1 + tseg1 + tseg2` time quanta of `brp / CAN_CLOCK` seconds,
/// sampled after `1 + tseg1` of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Getters)]
pub struct TimingParameters {
    #[getter(copy)]
    brp: u8,
    #[getter(copy)]
    tseg1: u8,
    #[getter(copy)]
    tseg2: u8,
    #[getter(copy)]
    sjw: u8,
    #[getter(copy)]
    triple_sample: bool,
}

impl TimingParameters {
    pub fn new(brp: u8, tseg1: u8, tseg2: u8, sjw: u8, triple_sample: bool) -> Result<Self, CanError> {
        let check = |name: &str, value: u8, max: u8| {
            if (1..=max).contains(&value) {
                Ok(())
            }
            else {
                Err(CanError::configuration_error(format!("`{}`: {} is out of range 1..={}", name, value, max)))
            }
        };
        check("brp", brp, BRP_MAX)?;
        check("tseg1", tseg1, TSEG1_MAX)?;
        check("tseg2", tseg2, TSEG2_MAX)?;
        check("sjw", sjw, SJW_MAX)?;

        Ok(Self { brp, tseg1, tseg2, sjw, triple_sample })
    }

    /// Decode raw `BTR0`/`BTR1` values, every register pair is representable.
    pub fn from_registers(btr0: u8, btr1: u8) -> Self {
        Self {
            brp: (btr0 & 0x3F) + 1,
            sjw: (btr0 >> 6) + 1,
            tseg1: (btr1 & 0x0F) + 1,
            tseg2: ((btr1 >> 4) & 0x07) + 1,
            triple_sample: btr1 & 0x80 != 0,
        }
    }

    /// `(BTR0, BTR1)`
    pub fn registers(&self) -> (u8, u8) {
        let btr0 = ((self.sjw - 1) << 6) | (self.brp - 1);
        let btr1 = ((self.triple_sample as u8) << 7) | ((self.tseg2 - 1) << 4) | (self.tseg1 - 1);

        (btr0, btr1)
    }

    #[inline]
    pub fn time_quanta(&self) -> u32 {
        1 + self.tseg1 as u32 + self.tseg2 as u32
    }

    /// Effective bitrate, rounded to the nearest bit/s.
    pub fn bitrate(&self) -> u32 {
        let divisor = self.brp as u32 * self.time_quanta();
        (CAN_CLOCK + divisor / 2) / divisor
    }

    /// Sample point in per mille of the bit time.
    #[inline]
    pub fn sample_point(&self) -> u32 {
        1_000 * (1 + self.tseg1 as u32) / self.time_quanta()
    }
}

impl Display for TimingParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (btr0, btr1) = self.registers();
        write!(f, "{}bit/s BTR0: {:#04x} BTR1: {:#04x} (brp: {}, tseg1: {}, tseg2: {}, sjw: {}, sp: {}.{}%)",
               self.bitrate(), btr0, btr1,
               self.brp, self.tseg1, self.tseg2, self.sjw,
               self.sample_point() / 10, self.sample_point() % 10)
    }
}

/// Look a bitrate up in [`BITRATE_TABLE`].
pub fn lookup(bitrate: u32) -> Option<TimingParameters> {
    BITRATE_TABLE.iter()
        .find(|(v, _, _)| *v == bitrate)
        .map(|&(_, btr0, btr1)| TimingParameters::from_registers(btr0, btr1))
}

/// Compute the timing for `bitrate`.
///
/// Bitrates in [`BITRATE_TABLE`] return the vendor timing unchanged. Others are
/// searched, preferring in order the smallest bitrate error, a sample point
/// closest to 75%..87.5% and the smallest prescaler. There is no fallback to
/// an approximate rate: if nothing is within 0.1% the bitrate is refused.
pub fn compute(bitrate: u32) -> Result<TimingParameters, CanError> {
    if bitrate == 0 {
        return Err(CanError::configuration_error("bitrate must be positive"));
    }

    if let Some(timing) = lookup(bitrate) {
        log::trace!("CANALYST-II - bitrate: {} found in table", bitrate);
        return Ok(timing);
    }

    let best = search(bitrate)
        .ok_or(CanError::configuration_error(format!("no bit timing for bitrate: {}", bitrate)))?;

    if best.error_num * TOLERANCE_DIVISOR >= bitrate as u64 * best.divisor {
        return Err(CanError::configuration_error(
            format!("bitrate: {} can't be reached within 0.1%, closest is {}", bitrate, best.timing.bitrate())
        ));
    }

    log::debug!("CANALYST-II - computed timing: {}", best.timing);
    Ok(best.timing)
}

struct Candidate {
    timing: TimingParameters,
    /// bitrate error is `error_num / divisor` bit/s
    error_num: u64,
    divisor: u64,
    deviation: u32,
}

impl Candidate {
    fn rank(&self, other: &Self) -> Ordering {
        (self.error_num * other.divisor).cmp(&(other.error_num * self.divisor))
            .then(self.deviation.cmp(&other.deviation))
            .then(self.timing.brp.cmp(&other.timing.brp))
    }
}

fn search(bitrate: u32) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for brp in 1..=BRP_MAX {
        for tseg1 in (1..=TSEG1_MAX).rev() {
            for tseg2 in 1..=TSEG2_MAX {
                let timing = TimingParameters { brp, tseg1, tseg2, sjw: 1, triple_sample: false };
                let sample_point = timing.sample_point();
                if timing.time_quanta() < TIME_QUANTA_MIN
                    || !(SAMPLE_POINT_MIN..=SAMPLE_POINT_MAX).contains(&sample_point) {
                    continue;
                }

                let divisor = brp as u64 * timing.time_quanta() as u64;
                let candidate = Candidate {
                    timing,
                    error_num: (CAN_CLOCK as u64).abs_diff(bitrate as u64 * divisor),
                    divisor,
                    deviation: match sample_point {
                        v if v < SAMPLE_POINT_LOW => SAMPLE_POINT_LOW - v,
                        v if v > SAMPLE_POINT_HIGH => v - SAMPLE_POINT_HIGH,
                        _ => 0,
                    },
                };

                let replace = match &best {
                    Some(v) => candidate.rank(v) == Ordering::Less,
                    None => true,
                };
                if replace {
                    best = Some(candidate);
                }
            }
        }
    }

    best
}
