/// Indicates that the `Nfc4` instance is not initialized yet
#[derive(Debug)]
pub struct Uninitialized;

/// Indicates that the `Nfc4` instance is ready to be used, field off
#[derive(Debug)]
pub struct Ready;

/// Indicates that the `Nfc4` instance polls for ISO14443-A cards
#[derive(Debug, Default)]
pub struct NfcA {
    /// ATQA of the last REQA/WUPA answer
    pub(super) atqa: Option<[u8; 2]>,
}

/// Any state in which the oscillator runs and the chip accepts commands
pub trait Awake: private::Sealed {}

impl Awake for Ready {}
impl Awake for NfcA {}

mod private {
    pub trait Sealed {}

    impl Sealed for super::Ready {}
    impl Sealed for super::NfcA {}
}
