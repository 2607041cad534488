//! Target interfaces a probe can use to talk to the debugged chip.

use bitflags::bitflags;
use std::fmt;

macro_rules! target_interfaces {
    (
        $(
            $( #[$($attr:tt)*] )*
            $variant:ident / $flag:ident = $bit:literal, $name:literal;
        )+
    ) => {
        /// A target interface (JTAG, SWD, ...).
        ///
        /// The discriminant is the interface number used by the `SELECT_IF` command.
        #[non_exhaustive]
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub enum TargetInterface {
            $(
                $( #[$($attr)*] )*
                $variant = $bit,
            )+
        }

        impl TargetInterface {
            const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            pub(crate) fn from_u32(raw: u32) -> Option<Self> {
                match raw {
                    $( $bit => Some(Self::$variant), )+
                    _ => None,
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }
        }

        bitflags! {
            /// Set of target interfaces, as reported by `SELECT_IF`.
            ///
            /// Bit *n* stands for the interface with number *n*.
            pub struct TargetInterfaces: u32 {
                $(
                    $( #[$($attr)*] )*
                    const $flag = 1 << $bit;
                )+
            }
        }
    };
}

target_interfaces! {
    /// JTAG interface.
    Jtag / JTAG = 0, "JTAG";
    /// SWD interface (Serial Wire Debug), used by most Cortex-M chips.
    Swd / SWD = 1, "SWD";
    /// Background Debug Mode 3.
    Bdm3 / BDM3 = 2, "BDM3";
    /// FINE, a two-wire debugging interface used by Renesas RX MCUs.
    Fine / FINE = 3, "FINE";
    /// In-Circuit System Programming (ICSP) interface of PIC32 chips.
    Pic32Icsp / PIC32_ICSP = 4, "PIC32 ICSP";
    /// Serial Peripheral Interface.
    Spi / SPI = 5, "SPI";
    /// Silicon Labs' 2-wire debug interface.
    C2 / C2 = 6, "C2";
    /// Compact JTAG, as specified in IEEE 1149.7.
    CJtag / CJTAG = 7, "cJTAG";
    /// 2-wire debugging interface used by Microchip's IS208x MCUs.
    Mc2WireJtag / MC_2WIRE_JTAG = 10, "Microchip 2-wire JTAG";
}

impl TargetInterface {
    /// Returns the interface number sent to and received from the probe.
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Returns the single-bit set containing this interface.
    pub fn as_flag(self) -> TargetInterfaces {
        TargetInterfaces::from_bits_truncate(1 << self.number())
    }
}

impl fmt::Display for TargetInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TargetInterfaces {
    /// Converts a raw bit mask, dropping (and logging) bits of unknown interfaces.
    pub(crate) fn from_bits_warn(raw: u32) -> Self {
        let this = Self::from_bits_truncate(raw);
        if this.bits() != raw {
            log::debug!(
                "unknown bits in interface mask: 0x{:08X} truncated to 0x{:08X} ({:?})",
                raw,
                this.bits(),
                this,
            );
        }
        this
    }

    /// Returns an iterator over the [`TargetInterface`]s in this set, in ascending order.
    ///
    /// [`TargetInterface`]: enum.TargetInterface.html
    pub fn iter(self) -> impl Iterator<Item = TargetInterface> {
        TargetInterface::ALL
            .iter()
            .copied()
            .filter(move |intf| self.contains(intf.as_flag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(TargetInterface::from_u32(1), Some(TargetInterface::Swd));
        assert_eq!(
            TargetInterface::from_u32(10),
            Some(TargetInterface::Mc2WireJtag)
        );
        assert_eq!(TargetInterface::from_u32(8), None);
        assert_eq!(TargetInterface::CJtag.number(), 7);
        assert_eq!(TargetInterface::Fine.as_flag(), TargetInterfaces::FINE);
        assert_eq!(TargetInterface::Pic32Icsp.to_string(), "PIC32 ICSP");
    }

    #[test]
    fn iter() {
        assert_eq!(TargetInterfaces::empty().iter().count(), 0);
        assert_eq!(
            (TargetInterfaces::SWD | TargetInterfaces::JTAG)
                .iter()
                .collect::<Vec<_>>(),
            &[TargetInterface::Jtag, TargetInterface::Swd]
        );
    }

    #[test]
    fn flags_match_numbers() {
        for intf in TargetInterface::ALL {
            assert_eq!(intf.as_flag().bits(), 1 << intf.number());
        }
        assert_eq!(
            TargetInterfaces::all().iter().count(),
            TargetInterface::ALL.len()
        );
    }

    #[test]
    fn unknown_bits_are_dropped() {
        let intfs = TargetInterfaces::from_bits_warn(0x0000_0103);
        assert_eq!(intfs, TargetInterfaces::JTAG | TargetInterfaces::SWD);
    }
}
