use embedded_hal_1::digital::OutputPin;
use heapless::LinearMap;
use log::warn;
use smart_leds::{RGB8, SmartLedsWrite};

const MAX_LAYER_COLORS: usize = 8;

/// Shows which layer is on top of the stack.
pub trait LayerStatusLed {
    fn update(&mut self, layer: u8);
}

/// No status LED fitted.
impl LayerStatusLed for () {
    fn update(&mut self, _layer: u8) {}
}

/// One GPIO per layer; the active layer's LED is lit.
pub struct LedArray<P: OutputPin, const N: usize> {
    pins: [P; N],
}

impl<P: OutputPin, const N: usize> LedArray<P, N> {
    pub fn new(pins: [P; N]) -> Self {
        Self { pins }
    }
}

impl<P: OutputPin, const N: usize> LayerStatusLed for LedArray<P, N> {
    fn update(&mut self, layer: u8) {
        for (i, pin) in self.pins.iter_mut().enumerate() {
            let res = if i == layer as usize {
                pin.set_high()
            } else {
                pin.set_low()
            };
            if res.is_err() {
                warn!("status led pin {i} write failed");
            }
        }
    }
}

/// Single NeoPixel with a per-layer color table; unknown layers go
/// dark.
pub struct RgbStatusLed<S: SmartLedsWrite<Color = RGB8>> {
    strip: S,
    colors: LinearMap<u8, RGB8, MAX_LAYER_COLORS>,
}

impl<S: SmartLedsWrite<Color = RGB8>> RgbStatusLed<S> {
    pub fn new(strip: S) -> Self {
        Self {
            strip,
            colors: LinearMap::new(),
        }
    }

    pub fn add_layer(&mut self, layer: u8, color: RGB8) {
        if self.colors.insert(layer, color).is_err() {
            warn!("layer color table full, dropping color for layer {layer}");
        }
    }
}

impl<S: SmartLedsWrite<Color = RGB8>> LayerStatusLed for RgbStatusLed<S> {
    fn update(&mut self, layer: u8) {
        let color = self
            .colors
            .get(&layer)
            .copied()
            .unwrap_or(RGB8::new(0, 0, 0));
        if self.strip.write([color].into_iter()).is_err() {
            warn!("status pixel write failed");
        }
    }
}

/// Discrete red/green/blue pins; a channel is on when its component in
/// the layer color is nonzero.
pub struct ThreePinStatusLed<P: OutputPin> {
    red: P,
    green: P,
    blue: P,
    colors: LinearMap<u8, RGB8, MAX_LAYER_COLORS>,
}

impl<P: OutputPin> ThreePinStatusLed<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        Self {
            red,
            green,
            blue,
            colors: LinearMap::new(),
        }
    }

    pub fn add_layer(&mut self, layer: u8, color: RGB8) {
        if self.colors.insert(layer, color).is_err() {
            warn!("layer color table full, dropping color for layer {layer}");
        }
    }
}

impl<P: OutputPin> LayerStatusLed for ThreePinStatusLed<P> {
    fn update(&mut self, layer: u8) {
        let color = self
            .colors
            .get(&layer)
            .copied()
            .unwrap_or(RGB8::new(0, 0, 0));
        let channels = [
            (&mut self.red, color.r),
            (&mut self.green, color.g),
            (&mut self.blue, color.b),
        ];
        for (pin, value) in channels {
            let res = if value != 0 {
                pin.set_high()
            } else {
                pin.set_low()
            };
            if res.is_err() {
                warn!("status led channel write failed");
            }
        }
    }
}
