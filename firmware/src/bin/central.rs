#![no_std]
#![no_main]

use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_nrf::buffered_uarte::{self, BufferedUarte, BufferedUarteRx, BufferedUarteTx};
use embassy_nrf::config::HfclkSource;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::usb::vbus_detect::HardwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{bind_interrupts, peripherals, uarte, usb};
use embassy_time::{Instant, Timer};
use embassy_usb::class::hid::{HidWriter, State};
use embassy_usb::{Builder, Handler};
use heapless::Vec;
use mkx::central::Central;
use mkx::hid::{HidState, OutputReport};
use mkx::interface::{CoverageRect, LoopbackTransport, PeripheryInterface};
use mkx::matrix::{DiodeOrientation, KeyChange, MatrixScanner, Pull as ActiveLevel};
use mkx::message::Message;
use mkx::status_led::ThreePinStatusLed;
use mkx::LOCAL_DEVICE;
use mkx_nrf::error::halt_on_config_error;
use mkx_nrf::keymap::KEYMAP;
use mkx_nrf::link::{CentralTransport, LinkBuffers};
use mkx_nrf::{HALF_COLS, LINK_BAUD, ROWS};
use smart_leds::RGB8;
use static_cell::StaticCell;
use usbd_hid::descriptor::{
    KeyboardReport, MediaKeyboardReport, MouseReport, SerializedDescriptor,
};
use {defmt_rtt as _, panic_probe as _};

static LINK: LinkBuffers = LinkBuffers::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

bind_interrupts!(struct Irqs {
    USBD => usb::InterruptHandler<peripherals::USBD>;
    CLOCK_POWER => usb::vbus_detect::InterruptHandler;
    UARTE0_UART0 => buffered_uarte::InterruptHandler<peripherals::UARTE0>;
});

#[embassy_executor::task]
async fn link_task(rx: BufferedUarteRx<'static>, tx: BufferedUarteTx<'static>) {
    LINK.pump(rx, tx).await;
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.hfclk_source = HfclkSource::ExternalXtal;
    let p = embassy_nrf::init(nrf_config);

    let driver = Driver::new(p.USBD, Irqs, HardwareVbusDetect::new(Irqs));

    let mut config = embassy_usb::Config::new(0xa55, 0xa66);
    config.manufacturer = Some("MKX");
    config.product = Some("MKX Split (Central)");
    config.max_power = 500;
    config.max_packet_size_0 = 64;
    config.composite_with_iads = true;
    config.device_class = 0xef;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;

    let mut config_descriptor = [0; 256];
    let mut bos_descriptor = [0; 256];
    let mut msos_descriptor = [0; 256];
    let mut control_buf = [0; 64];
    let mut device_handler = UsbDeviceHandler::new();

    let mut key_state = State::new();
    let mut media_state = State::new();
    let mut mouse_state = State::new();

    let mut builder = Builder::new(
        driver,
        config,
        &mut config_descriptor,
        &mut bos_descriptor,
        &mut msos_descriptor,
        &mut control_buf,
    );
    builder.handler(&mut device_handler);

    let key_config = embassy_usb::class::hid::Config {
        report_descriptor: KeyboardReport::desc(),
        request_handler: None,
        poll_ms: 1,
        max_packet_size: 8,
    };
    let media_config = embassy_usb::class::hid::Config {
        report_descriptor: MediaKeyboardReport::desc(),
        request_handler: None,
        poll_ms: 1,
        max_packet_size: 2,
    };
    let mouse_config = embassy_usb::class::hid::Config {
        report_descriptor: MouseReport::desc(),
        request_handler: None,
        poll_ms: 1,
        max_packet_size: 5,
    };
    let mut key_writer = HidWriter::<_, 8>::new(&mut builder, &mut key_state, key_config);
    let mut media_writer = HidWriter::<_, 2>::new(&mut builder, &mut media_state, media_config);
    let mut mouse_writer = HidWriter::<_, 5>::new(&mut builder, &mut mouse_state, mouse_config);

    let mut usb = builder.build();
    let usb_fut = usb.run();

    let mut uart_config = uarte::Config::default();
    uart_config.baudrate = LINK_BAUD;
    let uart = BufferedUarte::new(
        p.UARTE0,
        p.TIMER0,
        p.PPI_CH0,
        p.PPI_CH1,
        p.PPI_GROUP0,
        Irqs,
        p.P0_08,
        p.P0_06,
        uart_config,
        RX_BUF.init([0; 256]),
        TX_BUF.init([0; 256]),
    );
    let (uart_rx, uart_tx) = uart.split();
    spawner.spawn(link_task(uart_rx, uart_tx)).unwrap();

    let columns = [
        Output::new(p.P0_09, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_10, Level::Low, OutputDrive::Standard),
        Output::new(p.P1_11, Level::Low, OutputDrive::Standard),
        Output::new(p.P1_15, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_02, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_29, Level::Low, OutputDrive::Standard),
    ];
    let rows = [
        Input::new(p.P1_00, Pull::Down),
        Input::new(p.P0_11, Pull::Down),
        Input::new(p.P1_04, Pull::Down),
        Input::new(p.P1_06, Pull::Down),
    ];
    let mut matrix: MatrixScanner<_, _, HALF_COLS, ROWS> =
        MatrixScanner::new(columns, rows, DiodeOrientation::Col2Row, ActiveLevel::Down);

    let mut central: Central<CentralTransport, HidState, ThreePinStatusLed<Output<'static>>> =
        Central::new(KEYMAP, HidState::new());

    // left half is the central's own matrix, right half mirrors its
    // columns toward the center
    let local = PeripheryInterface::new(
        "left",
        CentralTransport::Local(LoopbackTransport::new()),
        CoverageRect::new(0, 0, (HALF_COLS - 1) as u8, (ROWS - 1) as u8),
    );
    central.add_interface(local).ok().unwrap();
    let remote = PeripheryInterface::new(
        "right",
        CentralTransport::Uart(LINK.transport()),
        CoverageRect::new(
            (KEYMAP.cols - 1) as u8,
            0,
            HALF_COLS as u8,
            (ROWS - 1) as u8,
        ),
    );
    central.add_interface(remote).ok().unwrap();

    if let Err(err) = central.check() {
        error!("keymap check found {} violation(s)", err.violations().len());
        halt_on_config_error(p.PWM0, p.P0_26).await;
    }

    let mut status = ThreePinStatusLed::new(
        Output::new(p.P0_26, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_27, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_28, Level::Low, OutputDrive::Standard),
    );
    status.add_layer(1, RGB8::new(0, 0, 255));
    status.add_layer(2, RGB8::new(0, 255, 0));
    central.set_status_led(status);

    info!("central started");

    let frame_loop = async {
        let mut events: Vec<KeyChange, 16> = Vec::new();
        loop {
            let now = Instant::now().as_millis();
            events.clear();
            matrix.scan_events(&mut events).unwrap();
            if !events.is_empty() {
                let transport = central.interface_transport_mut(LOCAL_DEVICE).unwrap();
                for change in &events {
                    transport.push_local_message(&Message::KeyEvent {
                        col: change.col,
                        row: change.row,
                        pressed: change.pressed,
                        timestamp_ms: now as u32,
                    });
                }
            }

            central.run_frame(now);

            while let Some(report) = central.hid_mut().pop_report() {
                match report {
                    OutputReport::Keyboard(rep) => {
                        key_writer.write_serialize(&rep).await.unwrap();
                    }
                    OutputReport::Media(rep) => {
                        media_writer.write_serialize(&rep).await.unwrap();
                    }
                    OutputReport::Mouse(rep) => {
                        mouse_writer.write_serialize(&rep).await.unwrap();
                    }
                }
            }
            Timer::after_millis(1).await;
        }
    };
    join(usb_fut, frame_loop).await;
}

struct UsbDeviceHandler {
    configured: AtomicBool,
}

impl UsbDeviceHandler {
    fn new() -> Self {
        UsbDeviceHandler {
            configured: AtomicBool::new(false),
        }
    }
}

impl Handler for UsbDeviceHandler {
    fn enabled(&mut self, enabled: bool) {
        self.configured.store(false, Ordering::Relaxed);
        if enabled {
            info!("Device enabled");
        } else {
            info!("Device disabled");
        }
    }

    fn reset(&mut self) {
        self.configured.store(false, Ordering::Relaxed);
        info!("Bus reset, the Vbus current limit is 100mA");
    }

    fn addressed(&mut self, addr: u8) {
        self.configured.store(false, Ordering::Relaxed);
        info!("USB address set to: {}", addr);
    }

    fn configured(&mut self, configured: bool) {
        self.configured.store(configured, Ordering::Relaxed);
        if configured {
            info!(
                "Device configured, it may now draw up to the configured current limit from Vbus."
            )
        } else {
            info!("Device is no longer configured, the Vbus current limit is 100mA.");
        }
    }
}
