//! HID usage-page registry.
//!
//! Static mapping between numeric usage-page codes and symbolic names so higher
//! layers can render `usage_page` fields. See the USB HID Usage Tables document.
//!
//! Lookups are total: reserved codes resolve to [`UsagePage::Reserved`], whose name is
//! `"Undefined"`, and the whole `0xFF00..=0xFFFF` range resolves to
//! [`UsagePage::VendorDefined`], named with its code (`"VendorDefined(0xFF55)"`).
//!
//! Some pages carry historical aliases. `"WeighingDevice"` and `"Scale"` both name
//! page `0x8D`; [`UsagePage::from_name`] accepts either and the canonical name is `"Scale"`.

use std::borrow::Cow;
use std::fmt;

/// First code of the vendor-defined usage-page range.
pub const VENDOR_DEFINED_START: u16 = 0xFF00;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UsagePage {
    Undefined,
    GenericDesktop,
    Simulation,
    Vr,
    Sport,
    Game,
    GenericDeviceControls,
    KeyboardOrKeypad,
    Led,
    Button,
    Ordinal,
    Telephony,
    Consumer,
    Digitizer,
    Haptics,
    PhysicalInterface,
    Unicode,
    EyeHeadTracker,
    AlphanumericDisplay,
    Sensor,
    MedicalInstrument,
    BrailleDisplay,
    LightingAndIllumination,
    Monitor,
    MonitorEnumerated,
    MonitorVirtual,
    MonitorReserved,
    PowerDevice,
    BatterySystem,
    PowerReserved,
    PowerReserved2,
    BarCodeScanner,
    Scale,
    MagneticStripeReader,
    ReservedPointOfSale,
    CameraControl,
    Arcade,
    Fido,
    /// `0xFF00..=0xFFFF`; the raw code is kept.
    VendorDefined(u16),
    /// Any code the tables do not assign.
    Reserved(u16),
}

/// `(page, code, canonical name)` for every named page.
const PAGES: &[(UsagePage, u16, &str)] = &[
    (UsagePage::Undefined, 0x00, "Undefined"),
    (UsagePage::GenericDesktop, 0x01, "GenericDesktop"),
    (UsagePage::Simulation, 0x02, "Simulation"),
    (UsagePage::Vr, 0x03, "VR"),
    (UsagePage::Sport, 0x04, "Sport"),
    (UsagePage::Game, 0x05, "Game"),
    (UsagePage::GenericDeviceControls, 0x06, "GenericDeviceControls"),
    (UsagePage::KeyboardOrKeypad, 0x07, "KeyboardOrKeypad"),
    (UsagePage::Led, 0x08, "LEDs"),
    (UsagePage::Button, 0x09, "Button"),
    (UsagePage::Ordinal, 0x0A, "Ordinal"),
    (UsagePage::Telephony, 0x0B, "Telephony"),
    (UsagePage::Consumer, 0x0C, "Consumer"),
    (UsagePage::Digitizer, 0x0D, "Digitizer"),
    (UsagePage::Haptics, 0x0E, "Haptics"),
    (UsagePage::PhysicalInterface, 0x0F, "PID"),
    (UsagePage::Unicode, 0x10, "Unicode"),
    (UsagePage::EyeHeadTracker, 0x12, "EyeHeadTracker"),
    (UsagePage::AlphanumericDisplay, 0x14, "AlphanumericDisplay"),
    (UsagePage::Sensor, 0x20, "Sensor"),
    (UsagePage::MedicalInstrument, 0x40, "MedicalInstrument"),
    (UsagePage::BrailleDisplay, 0x41, "BrailleDisplay"),
    (UsagePage::LightingAndIllumination, 0x59, "LightingAndIllumination"),
    (UsagePage::Monitor, 0x80, "Monitor"),
    (UsagePage::MonitorEnumerated, 0x81, "MonitorEnumerated"),
    (UsagePage::MonitorVirtual, 0x82, "MonitorVirtual"),
    (UsagePage::MonitorReserved, 0x83, "MonitorReserved"),
    (UsagePage::PowerDevice, 0x84, "PowerDevice"),
    (UsagePage::BatterySystem, 0x85, "BatterySystem"),
    (UsagePage::PowerReserved, 0x86, "PowerReserved"),
    (UsagePage::PowerReserved2, 0x87, "PowerReserved2"),
    (UsagePage::BarCodeScanner, 0x8C, "BarCodeScanner"),
    (UsagePage::Scale, 0x8D, "Scale"),
    (UsagePage::MagneticStripeReader, 0x8E, "MagneticStripeReader"),
    (UsagePage::ReservedPointOfSale, 0x8F, "ReservedPointOfSale"),
    (UsagePage::CameraControl, 0x90, "CameraControl"),
    (UsagePage::Arcade, 0x91, "Arcade"),
    (UsagePage::Fido, 0xF1D0, "FIDO"),
];

/// Alternate spellings that resolve to an existing page.
const ALIASES: &[(&str, UsagePage)] = &[
    ("WeighingDevice", UsagePage::Scale),
    ("PhysicalInterface", UsagePage::PhysicalInterface),
    ("VendorDefinedStart", UsagePage::VendorDefined(VENDOR_DEFINED_START)),
];

impl UsagePage {
    /// Resolve a numeric code. Never fails.
    pub fn from_code(code: u16) -> Self {
        if code >= VENDOR_DEFINED_START {
            return UsagePage::VendorDefined(code);
        }
        PAGES
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(page, _, _)| *page)
            .unwrap_or(UsagePage::Reserved(code))
    }

    pub fn code(self) -> u16 {
        match self {
            UsagePage::VendorDefined(code) | UsagePage::Reserved(code) => code,
            page => PAGES
                .iter()
                .find(|(p, _, _)| *p == page)
                .map(|(_, code, _)| *code)
                .unwrap_or(0),
        }
    }

    /// Canonical symbolic name.
    ///
    /// Vendor pages carry their code, e.g. `VendorDefined(0xFF55)`, so the name maps
    /// back to the same page.
    pub fn name(self) -> Cow<'static, str> {
        match self {
            UsagePage::VendorDefined(code) => Cow::Owned(format!("VendorDefined(0x{code:04X})")),
            UsagePage::Reserved(_) => Cow::Borrowed("Undefined"),
            page => Cow::Borrowed(
                PAGES
                    .iter()
                    .find(|(p, _, _)| *p == page)
                    .map(|(_, _, name)| *name)
                    .unwrap_or("Undefined"),
            ),
        }
    }

    /// Reverse lookup by canonical name or alias.
    ///
    /// Bare `"VendorDefined"` resolves to the start of the vendor range.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(code) = parse_vendor_name(name) {
            return Some(UsagePage::VendorDefined(code));
        }
        if name == "VendorDefined" {
            return Some(UsagePage::VendorDefined(VENDOR_DEFINED_START));
        }
        PAGES
            .iter()
            .find(|(_, _, n)| *n == name)
            .map(|(page, _, _)| *page)
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == name)
                    .map(|(_, page)| *page)
            })
    }

    pub fn is_vendor_defined(self) -> bool {
        matches!(self, UsagePage::VendorDefined(_))
    }

    /// Every page with a fixed code, in code order.
    pub fn known() -> impl Iterator<Item = UsagePage> {
        PAGES.iter().map(|(page, _, _)| *page)
    }
}

/// `VendorDefined(0xFFxx)` → `0xFFxx`, only inside the vendor range.
fn parse_vendor_name(name: &str) -> Option<u16> {
    let hex = name
        .strip_prefix("VendorDefined(0x")?
        .strip_suffix(')')?;
    let code = u16::from_str_radix(hex, 16).ok()?;
    (code >= VENDOR_DEFINED_START).then_some(code)
}

impl From<u16> for UsagePage {
    fn from(code: u16) -> Self {
        UsagePage::from_code(code)
    }
}

impl fmt::Display for UsagePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsagePage::Reserved(code) => write!(f, "Undefined (0x{code:04X})"),
            page => f.write_str(&page.name()),
        }
    }
}

/// Resolve `code` to its page. Unknown codes yield [`UsagePage::Reserved`].
pub fn lookup(code: u16) -> UsagePage {
    UsagePage::from_code(code)
}

/// Symbolic name of a page.
pub fn name_of(page: UsagePage) -> Cow<'static, str> {
    page.name()
}

/// Usages on the Generic Desktop page that identify a top-level device kind.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GenericDesktopUsage {
    Pointer = 0x01,
    Mouse = 0x02,
    Joystick = 0x04,
    GamePad = 0x05,
    Keyboard = 0x06,
    Keypad = 0x07,
    MultiAxisController = 0x08,
}

impl GenericDesktopUsage {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x01 => Self::Pointer,
            0x02 => Self::Mouse,
            0x04 => Self::Joystick,
            0x05 => Self::GamePad,
            0x06 => Self::Keyboard,
            0x07 => Self::Keypad,
            0x08 => Self::MultiAxisController,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}
