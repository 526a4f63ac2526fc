//! Fatal configuration errors halt instead of resetting, so the board
//! stays connected and flashable while the keymap gets fixed. The red
//! status channel fades in and out as the visual signal.

use embassy_nrf::Peri;
use embassy_nrf::gpio::Pin;
use embassy_nrf::peripherals::PWM0;
use embassy_nrf::pwm::SimplePwm;
use embassy_time::Timer;

const FADE_STEP_MS: u64 = 8;

pub async fn halt_on_config_error(pwm: Peri<'_, PWM0>, red: Peri<'_, impl Pin>) -> ! {
    let mut pwm = SimplePwm::new_1ch(pwm, red);
    pwm.set_max_duty(255);
    loop {
        for duty in (0..=255u16).chain((0..=255u16).rev()) {
            pwm.set_duty(0, duty);
            Timer::after_millis(FADE_STEP_MS).await;
        }
    }
}
