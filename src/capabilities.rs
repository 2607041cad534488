use std::fmt;

/// Size of the capability bit array returned by the `GET_CAPS` command.
pub const CAPS_SIZE: usize = 4;

/// Size of the capability bit array returned by the `GET_EXT_CAPS` command.
pub const EXT_CAPS_SIZE: usize = 32;

/// Checks whether bit `cap` is set in the capability bit array `caps`.
///
/// Bit 0 is the least significant bit of `caps[0]`, bit 8 the least significant bit of `caps[1]`,
/// and so on.
///
/// # Panics
///
/// `caps` must be at least `cap / 8 + 1` bytes long, otherwise this function panics.
pub fn has_cap(caps: &[u8], cap: u32) -> bool {
    caps[(cap / 8) as usize] & (1 << (cap % 8)) != 0
}

macro_rules! capabilities {
    (
        $(
            $( #[$attr:meta] )*
            $name:ident = $bit:expr,
        )+
    ) => {
        /// A capability a J-Link device can advertise.
        ///
        /// The discriminant is the bit position in the capability bit array.
        #[non_exhaustive]
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub enum Capability {
            $(
                $( #[$attr] )*
                $name = $bit,
            )+
        }

        impl Capability {
            const ALL: &'static [Self] = &[ $( Self::$name, )+ ];
        }
    };
}

capabilities! {
    GetHwVersion = 1,
    WriteDcc = 2,
    /// Adaptive clocking (RTCK) is supported.
    AdaptiveClocking = 3,
    ReadConfig = 4,
    WriteConfig = 5,
    Trace = 6,
    WriteMem = 7,
    ReadMem = 8,
    /// `GET_SPEEDS` is supported.
    SpeedInfo = 9,
    ExecCode = 10,
    /// `GET_FREE_MEMORY` is supported.
    GetFreeMemory = 11,
    GetHwInfo = 12,
    /// The 5V supply on pin 19 can be switched.
    SetTargetPower = 13,
    ResetStopTimed = 14,
    MeasureRtckReact = 16,
    /// The target interface can be selected (JTAG, SWD, ...).
    SelectTargetInterface = 17,
    RwMemArm79 = 18,
    GetCounters = 19,
    ReadDcc = 20,
    GetCpuCaps = 21,
    ExecCpuCmd = 22,
    Swo = 23,
    WriteDccEx = 24,
    UpdateFirmwareEx = 25,
    FileIo = 26,
    Register = 27,
    Indicators = 28,
    TestNetSpeed = 29,
    RawTrace = 30,
    // Documented as reserved, but there would be no other way to know whether the extended
    // capabilities can be read.
    /// `GET_EXT_CAPS` is supported.
    GetExtCaps = 31,
    HwJtagWrite = 32,
    /// EMUCOM channels are supported.
    Emucom = 33,
}

/// Set of capabilities advertised by a device.
///
/// This holds the full 256-bit capability array. Sets built from the legacy 32-bit capabilities
/// have all higher bits cleared.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    bits: [u8; EXT_CAPS_SIZE],
}

impl Capabilities {
    /// Creates a `Capabilities` instance from the 32-bit `GET_CAPS` response.
    pub(crate) fn from_raw_legacy(raw: [u8; CAPS_SIZE]) -> Self {
        let mut bits = [0; EXT_CAPS_SIZE];
        bits[..CAPS_SIZE].copy_from_slice(&raw);
        Self { bits }
    }

    /// Creates a `Capabilities` instance from the 256-bit `GET_EXT_CAPS` response.
    pub(crate) fn from_raw_ex(raw: [u8; EXT_CAPS_SIZE]) -> Self {
        Self { bits: raw }
    }

    /// Returns whether the device advertises `cap`.
    pub fn contains(&self, cap: Capability) -> bool {
        self.has_bit(cap as u32)
    }

    /// Returns whether bit `bit` is set.
    ///
    /// Bits beyond the 256-bit capability array are never set.
    pub fn has_bit(&self, bit: u32) -> bool {
        bit < (EXT_CAPS_SIZE * 8) as u32 && has_cap(&self.bits, bit)
    }

    /// Returns whether every capability in `self` is also present in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .all(|(mine, theirs)| mine & !theirs == 0)
    }

    /// Returns the raw capability bit array.
    pub fn as_bytes(&self) -> &[u8; EXT_CAPS_SIZE] {
        &self.bits
    }

    /// Returns an iterator over all known capabilities in this set.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .iter()
            .copied()
            .filter(move |cap| self.contains(*cap))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut unknown = self.bits;
        for cap in self.iter() {
            let bit = cap as usize;
            unknown[bit / 8] &= !(1 << (bit % 8));
        }

        let mut list = f.debug_set();
        list.entries(self.iter());
        // Bit 0 is reserved and always set on real hardware.
        let unknown_bits = (1..EXT_CAPS_SIZE as u32 * 8).filter(|&bit| has_cap(&unknown, bit));
        for bit in unknown_bits {
            list.entry(&format_args!("bit {}", bit));
        }
        list.finish()
    }
}
