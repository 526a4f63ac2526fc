#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::Spawner;
use embassy_nrf::buffered_uarte::{self, BufferedUarte, BufferedUarteRx, BufferedUarteTx};
use embassy_nrf::config::HfclkSource;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::{bind_interrupts, peripherals, uarte};
use embassy_time::{Instant, Timer};
use mkx::matrix::{DiodeOrientation, MatrixScanner, Pull as ActiveLevel};
use mkx::periphery::Periphery;
use mkx::status_led::ThreePinStatusLed;
use mkx_nrf::link::{LinkBuffers, UartLink};
use mkx_nrf::{HALF_COLS, LINK_BAUD, ROWS};
use smart_leds::RGB8;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

static LINK: LinkBuffers = LinkBuffers::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

bind_interrupts!(struct Irqs {
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
    let scanner: MatrixScanner<_, _, HALF_COLS, ROWS> =
        MatrixScanner::new(columns, rows, DiodeOrientation::Col2Row, ActiveLevel::Down);

    // mirrors the central's layer state so both halves show the same
    // color
    let mut status = ThreePinStatusLed::new(
        Output::new(p.P0_26, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_27, Level::Low, OutputDrive::Standard),
        Output::new(p.P0_28, Level::Low, OutputDrive::Standard),
    );
    status.add_layer(1, RGB8::new(0, 0, 255));
    status.add_layer(2, RGB8::new(0, 255, 0));

    let mut periphery: Periphery<
        UartLink<'static>,
        Output<'static>,
        Input<'static>,
        ThreePinStatusLed<Output<'static>>,
        (),
        HALF_COLS,
        ROWS,
    > = Periphery::new(scanner, LINK.transport());
    periphery.set_status_led(status);

    info!("periphery started");

    loop {
        periphery.run_once(Instant::now().as_millis()).unwrap();
        Timer::after_millis(1).await;
    }
}
