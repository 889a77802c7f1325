use serde::{Deserialize, Serialize};

/// KEYINPUT is active-low: a set bit means the corresponding button is
/// released. All buttons read released at power-on.
const KEYINPUT_RESET: u16 = 0x03FF;

#[derive(Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
    pub key_interrupt_control: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self {
            key_input: KEYINPUT_RESET,
            key_interrupt_control: 0,
        }
    }
}
