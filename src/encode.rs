//! Functions for packing commands and unpacking conversion results

/// Command byte for the word-framed DACs: command nibble over channel nibble
pub fn dac_command(command: u8, channel: u8) -> u8 {
    (command & 0xf0) | (channel & 0x0f)
}

/// 32-bit SPI DAC frame: eight don't-care bits, command/address, code MSB, code LSB
pub fn dac_frame(command: u8, channel: u8, code: u16) -> [u8; 4] {
    let [msb, lsb] = code.to_be_bytes();
    [0x00, dac_command(command, channel), msb, lsb]
}

/// Decode the 32 bits an LTC2485 returns into a signed 24-bit code.
///
/// A first byte of 0xC0 or 0x3F signals over- or underrange and saturates the result.
pub fn delta_sigma_24(bytes: [u8; 4]) -> i32 {
    match bytes[0] {
        0xc0 => i32::MAX,
        0x3f => i32::MIN,
        _ => {
            let raw = u32::from_be_bytes(bytes) & 0x7fff_ffff;
            ((raw << 1) as i32) / 256
        }
    }
}

/// Left-justify a 24-bit result into the top three bytes of a 32-bit word
pub fn left_justify_24(bytes: [u8; 3]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0])
}

/// Bring a 32-bit I2C LTC24XX result into the SPI data format (MSB at bit 29)
pub fn i2c_to_spi_format(raw: u32) -> i32 {
    ((raw >> 2) & 0x3fff_ffff) as i32
}

/// Split a ping-pong result into the channel it belongs to and the code
pub fn ping_pong(raw: u32) -> (u8, i32) {
    let channel = if raw & 0x4000_0000 != 0 { 1 } else { 0 };
    (channel, (raw & 0x3fff_ffff) as i32)
}

/// 12-bit result that is left-aligned in a 16-bit register pair
pub fn left_aligned_12(word: u16) -> u16 {
    word >> 4
}

/// 10-bit result split as 8 high bits and 2 bits at the top of the next register
pub fn split_10(high: u8, low: u8) -> u16 {
    ((high as u16) << 2) | ((low as u16) >> 6)
}
