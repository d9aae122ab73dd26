// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the smallest unit of the cloud engine. It is a "dumb" data
// container for one RGB sample of the satellite strip plus the single-pixel numbers
// the higher layers need: the grayscale intensity used for texture statistics and
// the normalized brightness used as the primary cloud signal. Anything that needs
// more than one pixel (means over a region, variance, blur) lives elsewhere.
//
// The strip arrives as RGB without alpha, so unlike a video frame there is no
// transparency channel to carry around.

pub mod pixel {
    use image::Rgb;

    pub type Byte = u8;
    pub type Channel = Byte;
    pub type ComputedChannel = f64;
    pub type Gray = f64;
    pub type Brightness = f64;

    const CHANNELS: usize = 3;

    /// A single RGB sample taken from the strip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// Unweighted channel average on the 0..255 scale.
        ///
        /// This is the "grayscale" used for local texture: a plain mean, not a
        /// perceptual luma, so a warm street light and a neutral cloud of the same
        /// total energy land on the same gray level.
        pub fn gray(&self) -> Gray {
            (self.red as ComputedChannel + self.green as ComputedChannel + self.blue as ComputedChannel)
                / CHANNELS as ComputedChannel
        }

        /// `gray()` normalized to [0, 1].
        pub fn brightness(&self) -> Brightness {
            self.gray() / 255.0
        }
    }

    impl From<&Rgb<Byte>> for Pixel {
        fn from(rgb: &Rgb<Byte>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for Rgb<Byte> {
        fn from(pixel: Pixel) -> Self {
            Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }
}
