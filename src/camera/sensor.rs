//! MT9V032 sensor description: register map, timing constants and the
//! power-up register defaults used to seed the host register shadow.

/// Maximum number of frame buffers the capture machinery manages.
pub const MAX_FRAME_BUFFERS: u8 = 8;

/// The maximum image width of the sensor.
pub const MAX_IMAGE_WIDTH: u16 = 752;
/// The maximum image height of the sensor.
pub const MAX_IMAGE_HEIGHT: u16 = 480;

/// Pixel clock of the sensor in Hz.
pub const PIX_CLK_HZ: u32 = 25_000_000;
/// Pixel clocks per microsecond, the unit the shutter arithmetic
/// actually works in.
pub const PIX_CLKS_PER_US: u32 = PIX_CLK_HZ / 1_000_000;
/// The minimum row time of the sensor in pixel clocks. Bounds the
/// shutter-width quantization from below.
pub const MIN_ROW_CLKS: u32 = 660;

/// Default exposure time applied by the register presets, in
/// microseconds.
pub const DEFAULT_EXPOSURE_US: u32 = 15_000;
/// Default black-level offset. Pushes the black histogram fully above
/// zero so FPN correction does not clip.
pub const DEFAULT_BLACK_LEVEL: u16 = 13;

/// Register addresses of the sensor, as used by the framework.
pub mod reg {
    pub const COL_START: u16 = 0x01;
    pub const ROW_START: u16 = 0x02;
    pub const WIN_HEIGHT: u16 = 0x03;
    pub const WIN_WIDTH: u16 = 0x04;
    pub const HORIZ_BLANK: u16 = 0x05;
    pub const CHIP_CONTROL: u16 = 0x07;
    pub const SHUTTER_WIDTH: u16 = 0x0b;
    pub const RESET: u16 = 0x0c;
    pub const READ_MODE: u16 = 0x0d;
    /// Bit position of the row-flip flag in `READ_MODE`.
    pub const READ_MODE_ROW_FLIP: u16 = 4;
    /// Bit position of the column-flip flag in `READ_MODE`.
    pub const READ_MODE_COL_FLIP: u16 = 5;
    pub const PIXEL_OP_MODE: u16 = 0x0f;
    pub const LED_OUT_CONTROL: u16 = 0x1b;
    /// Marked reserved in the datasheet; 0x3d5 is the vendor-stated
    /// optimal value and helps brightness.
    pub const RESERVED_0X20: u16 = 0x20;
    pub const ROW_NOISE_CONST: u16 = 0x72;
    pub const AEC_AGC_ENA: u16 = 0xaf;
}

/// Power-up values of the sensor register file. The host register
/// shadow is seeded from this table; addresses not listed here do not
/// exist on the device and reads/writes to them fail.
pub const DEFAULT_REGISTERS: &[(u16, u16)] = &[
    (0x00, 0x1313), // chip version
    (0x01, 0x0001), // column start
    (0x02, 0x0004), // row start
    (0x03, 0x01e0), // window height
    (0x04, 0x02f0), // window width
    (0x05, 0x002b), // horizontal blanking
    (0x06, 0x002d), // vertical blanking
    (0x07, 0x0298), // chip control
    (0x08, 0x01bb), // shutter width 1
    (0x09, 0x01d9), // shutter width 2
    (0x0a, 0x0164), // shutter width ctrl
    (0x0b, 0x05dc), // total shutter width
    (0x0c, 0x0000), // reset
    (0x0d, 0x0320), // read mode
    (0x0e, 0x0000), // monitor mode
    (0x0f, 0x0015), // pixel operation mode
    (0x1b, 0x0000), // LED_OUT ctrl
    (0x1c, 0x0002), // ADC mode control
    (0x20, 0x03d5), // reserved
    (0x2c, 0x0004), // VREF_ADC control
    (0x31, 0x001d), // V1
    (0x32, 0x0018), // V2
    (0x33, 0x0015), // V3
    (0x34, 0x0004), // V4
    (0x35, 0x0010), // analog gain
    (0x36, 0x0040), // max analog gain
    (0x42, 0x0002), // frame dark average
    (0x46, 0x231d), // dark avg thresholds
    (0x47, 0x8080), // BL calib control
    (0x48, 0x007f), // BL calibration value
    (0x4c, 0x0002), // BL calib step size
    (0x70, 0x0014), // row noise corr ctrl 1
    (0x72, 0x002a), // row noise constant
    (0x73, 0x02f7), // row noise corr ctrl 2
    (0x74, 0x0000), // pixclk, FV, LV
    (0x7f, 0x0000), // digital test pattern
    (0xa5, 0x003a), // AEC/AGC desired bin
    (0xa6, 0x0002), // AEC update frequency
    (0xa8, 0x0000), // AEC LPF
    (0xa9, 0x0002), // AGC update frequency
    (0xab, 0x0002), // AGC LPF
    (0xaf, 0x0000), // AEC/AGC enable
    (0xb0, 0xabe0), // AEC/AGC pixel count
    (0xb4, 0x0000), // data stream latency
    (0xba, 0x0010), // AGC gain output
    (0xbb, 0x05dc), // AEC gain output
    (0xbc, 0x003f), // AGC/AEC current bin
    (0xbd, 0x01e0), // maximum shutter width
    (0xbe, 0x0014), // AGC/AEC bin difference threshold
    (0xbf, 0x0016), // field blank
    (0xc0, 0x000a), // monitor mode capture ctrl
    (0xc1, 0x015f), // temperature
    (0xc2, 0x0840), // analog controls
    (0xc3, 0x0000), // NTSC FV & LV ctrl
    (0xc4, 0x4416), // NTSC horizontal blank ctrl
    (0xc5, 0x4421), // NTSC vertical blank ctrl
    (0xf0, 0x2100), // bytewise address
    (0xfe, 0xbeef), // register lock
    (0xff, 0x1313), // chip version
];
