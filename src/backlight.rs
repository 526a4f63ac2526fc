use log::warn;
use smart_leds::{RGB8, SmartLedsWrite, brightness};

/// Per-frame backlight rendering; the central calls `shine` once per
/// frame loop iteration.
pub trait Backlight {
    fn shine(&mut self);
}

/// No backlight fitted.
impl Backlight for () {
    fn shine(&mut self) {}
}

/// Classic color wheel: 0..255 walks red -> green -> blue -> red.
pub fn wheel(pos: u8) -> RGB8 {
    match pos {
        0..=84 => RGB8::new(pos * 3, 255 - pos * 3, 0),
        85..=169 => {
            let pos = pos - 85;
            RGB8::new(255 - pos * 3, 0, pos * 3)
        }
        _ => {
            let pos = pos - 170;
            RGB8::new(0, pos * 3, 255 - pos * 3)
        }
    }
}

/// Animated rainbow over a NeoPixel strip. `swirl` distributes the
/// wheel across the strip; otherwise all pixels share one color.
pub struct NeopixelRainbow<S: SmartLedsWrite<Color = RGB8>, const N: usize> {
    strip: S,
    brightness: u8,
    wheel_pos: u8,
    wheel_speed: u8,
    frame_skip: u8,
    frame_count: u8,
    swirl: bool,
}

impl<S: SmartLedsWrite<Color = RGB8>, const N: usize> NeopixelRainbow<S, N> {
    pub fn new(strip: S, brightness: u8) -> Self {
        Self {
            strip,
            brightness,
            wheel_pos: 0,
            wheel_speed: 1,
            frame_skip: 0,
            frame_count: 0,
            swirl: true,
        }
    }

    /// Advance more wheel steps per frame, capped like the stock
    /// animation.
    pub fn faster(&mut self, speed: u8) {
        self.wheel_speed = speed.min(20);
        self.frame_skip = 0;
    }

    /// Hold each frame for `skip` extra frames.
    pub fn slower(&mut self, skip: u8) {
        self.frame_skip = skip;
        self.wheel_speed = 1;
    }

    pub fn set_swirl(&mut self, swirl: bool) {
        self.swirl = swirl;
    }
}

impl<S: SmartLedsWrite<Color = RGB8>, const N: usize> Backlight for NeopixelRainbow<S, N> {
    fn shine(&mut self) {
        if self.frame_count < self.frame_skip {
            self.frame_count += 1;
            return;
        }
        self.frame_count = 0;

        let mut colors = [RGB8::default(); N];
        if self.swirl {
            for (i, color) in colors.iter_mut().enumerate() {
                let pixel_index = (i * 256 / N) as u8;
                *color = wheel(pixel_index.wrapping_add(self.wheel_pos));
            }
        } else {
            colors.fill(wheel(self.wheel_pos));
        }

        if self
            .strip
            .write(brightness(colors.iter().copied(), self.brightness))
            .is_err()
        {
            warn!("backlight write failed");
        }
        self.wheel_pos = self.wheel_pos.wrapping_add(self.wheel_speed);
    }
}

/// Uniform static color.
pub struct NeopixelStatic<S: SmartLedsWrite<Color = RGB8>, const N: usize> {
    strip: S,
    color: RGB8,
    brightness: u8,
}

impl<S: SmartLedsWrite<Color = RGB8>, const N: usize> NeopixelStatic<S, N> {
    pub fn new(strip: S, color: RGB8, brightness: u8) -> Self {
        Self {
            strip,
            color,
            brightness,
        }
    }

    pub fn set_color(&mut self, color: RGB8) {
        self.color = color;
    }
}

impl<S: SmartLedsWrite<Color = RGB8>, const N: usize> Backlight for NeopixelStatic<S, N> {
    fn shine(&mut self) {
        let colors = [self.color; N];
        if self
            .strip
            .write(brightness(colors.iter().copied(), self.brightness))
            .is_err()
        {
            warn!("backlight write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn wheel_endpoints_are_pure_colors() {
        assert_eq!(wheel(0), RGB8::new(0, 255, 0));
        assert_eq!(wheel(85), RGB8::new(255, 0, 0));
        assert_eq!(wheel(170), RGB8::new(0, 0, 255));
    }

    #[test]
    fn wheel_components_always_sum_high() {
        // every position mixes exactly two channels out of 255 total
        for pos in 0u8..=255 {
            let c = wheel(pos);
            let sum = c.r as u16 + c.g as u16 + c.b as u16;
            assert!(sum >= 253, "pos {pos} summed to {sum}");
        }
    }

    struct RecordingStrip(Rc<RefCell<std::vec::Vec<RGB8>>>);

    impl SmartLedsWrite for RecordingStrip {
        type Error = Infallible;
        type Color = RGB8;
        fn write<T, I>(&mut self, iterator: T) -> Result<(), Infallible>
        where
            T: IntoIterator<Item = I>,
            I: Into<RGB8>,
        {
            let mut out = self.0.borrow_mut();
            out.clear();
            out.extend(iterator.into_iter().map(Into::into));
            Ok(())
        }
    }

    #[test]
    fn swirl_spreads_the_wheel_across_pixels() {
        let written = Rc::new(RefCell::new(std::vec::Vec::new()));
        let mut rainbow: NeopixelRainbow<_, 4> =
            NeopixelRainbow::new(RecordingStrip(written.clone()), 255);
        rainbow.shine();
        let frame = written.borrow().clone();
        assert_eq!(frame.len(), 4);
        assert_ne!(frame[0], frame[2]);
    }

    #[test]
    fn uniform_mode_uses_one_color() {
        let written = Rc::new(RefCell::new(std::vec::Vec::new()));
        let mut rainbow: NeopixelRainbow<_, 4> =
            NeopixelRainbow::new(RecordingStrip(written.clone()), 255);
        rainbow.set_swirl(false);
        rainbow.shine();
        let frame = written.borrow().clone();
        assert!(frame.iter().all(|&c| c == frame[0]));
    }

    #[test]
    fn frame_skip_throttles_updates() {
        let written = Rc::new(RefCell::new(std::vec::Vec::new()));
        let mut rainbow: NeopixelRainbow<_, 2> =
            NeopixelRainbow::new(RecordingStrip(written.clone()), 255);
        rainbow.slower(2);
        rainbow.shine();
        rainbow.shine();
        assert!(written.borrow().is_empty());
        rainbow.shine();
        assert!(!written.borrow().is_empty());
    }

    #[test]
    fn static_backlight_fills_the_strip() {
        let written = Rc::new(RefCell::new(std::vec::Vec::new()));
        let mut light: NeopixelStatic<_, 3> = NeopixelStatic::new(
            RecordingStrip(written.clone()),
            RGB8::new(0, 0, 255),
            255,
        );
        light.shine();
        assert_eq!(written.borrow().len(), 3);
        assert!(written.borrow().iter().all(|&c| c == RGB8::new(0, 0, 255)));
    }
}
