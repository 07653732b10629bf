//! Direct commands of the ST25R3916

/// Direct command enumeration
///
/// The value is the complete SPI mode byte (`11cccccc`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Puts the chip in default state (same as after power-up)
    SetDefault = 0xC1,
    /// Stops all activities and clears the FIFO
    Stop = 0xC2,
    /// Transmit the FIFO contents followed by a CRC
    TransmitWithCrc = 0xC4,
    /// Transmit the FIFO contents without a CRC
    TransmitWithoutCrc = 0xC5,
    /// Transmit an ISO14443-A REQA short frame
    TransmitReqa = 0xC6,
    /// Transmit an ISO14443-A WUPA short frame
    TransmitWupa = 0xC7,
    /// Perform initial RF collision avoidance and switch on the field
    InitialRfCollision = 0xC8,
    /// Perform response RF collision avoidance
    ResponseRfCollisionN = 0xC9,
    /// Enter sense state (target mode)
    GotoSense = 0xCD,
    /// Enter sleep state (target mode)
    GotoSleep = 0xCE,
    /// Mask receive data
    MaskReceiveData = 0xD0,
    /// Unmask receive data
    UnmaskReceiveData = 0xD1,
    /// Change the AM modulation state
    AmModStateChange = 0xD2,
    /// Measure the RF amplitude, result in A/D converter output register
    MeasureAmplitude = 0xD3,
    /// Reset the receiver gain
    ResetRxGain = 0xD5,
    /// Adjust the power supply regulators
    AdjustRegulators = 0xD6,
    /// Calibrate the driver timing
    CalibrateDriverTiming = 0xD8,
    /// Measure the phase between RFO and RFI
    MeasurePhase = 0xD9,
    /// Clear the RSSI bits
    ClearRssi = 0xDA,
    /// Clear the FIFO
    ClearFifo = 0xDB,
    /// Enter transparent mode
    TransparentMode = 0xDC,
    /// Calibrate the capacitive sensor
    CalibrateCSensor = 0xDD,
    /// Measure capacitance
    MeasureCapacitance = 0xDE,
    /// Measure the supply voltage
    MeasureVdd = 0xDF,
    /// Start the general purpose timer
    StartGpTimer = 0xE0,
    /// Start the wake-up timer
    StartWupTimer = 0xE1,
    /// Start the mask-receive timer
    StartMaskReceiveTimer = 0xE2,
    /// Start the no-response timer
    StartNoResponseTimer = 0xE3,
    /// Start the PPON2 timer
    StartPpon2Timer = 0xE4,
    /// Stop the no-response timer
    StopNrt = 0xE8,
}
