//! Serial-port access for the readout driver.

use std::future::Future;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialPortInfo,
    SerialPortType, SerialStream, StopBits,
};

use crate::error::Error;

/// USB identifiers of a SPORTident master station.
pub const SPORTIDENT_VID: u16 = 0x10C4;
pub const SPORTIDENT_PID: u16 = 0x800A;

pub const HIGH_BAUD_RATE: u32 = 38400;
pub const LOW_BAUD_RATE: u32 = 4800;

/// Byte-level access to a master station.
///
/// `write` completes once the bytes are drained to the device and `read`
/// returns as soon as any bytes arrive. Closing the port is dropping it.
pub trait SiPort {
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = crate::Result<()>>;
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = crate::Result<usize>>;
    fn set_baud_rate(&mut self, baud: u32) -> impl Future<Output = crate::Result<()>>;
}

/// A master station on a host serial port, 8N1 without flow control.
pub struct TokioSerial {
    serial: SerialStream,
}

impl TokioSerial {
    pub fn new(port: &str) -> crate::Result<Self> {
        let builder = tokio_serial::new(port, HIGH_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);
        let serial = builder
            .open_native_async()
            .map_err(|err| Error::Port(err.to_string()))?;
        Ok(Self { serial })
    }
}

impl SiPort for TokioSerial {
    async fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.serial
            .write_all(bytes)
            .await
            .map_err(|err| Error::Port(err.to_string()))?;
        self.serial.flush().await.map_err(|err| Error::Port(err.to_string()))
    }

    async fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        let count = self
            .serial
            .read(buf)
            .await
            .map_err(|err| Error::Port(err.to_string()))?;
        if count == 0 {
            return Err(Error::Port("serial port closed".to_string()));
        }
        Ok(count)
    }

    async fn set_baud_rate(&mut self, baud: u32) -> crate::Result<()> {
        SerialPort::set_baud_rate(&mut self.serial, baud)
            .map_err(|err| Error::Port(err.to_string()))
    }
}

/// All serial ports of the host.
pub fn available_ports() -> crate::Result<Vec<SerialPortInfo>> {
    tokio_serial::available_ports().map_err(|err| Error::Port(err.to_string()))
}

fn is_sportident(info: &SerialPortInfo) -> bool {
    matches!(&info.port_type, SerialPortType::UsbPort(usb)
        if usb.vid == SPORTIDENT_VID && usb.pid == SPORTIDENT_PID)
}

/// The first port that looks like a SPORTident master station.
pub fn detect_port() -> crate::Result<Option<String>> {
    Ok(available_ports()?.iter().find(|info| is_sportident(info)).map(|info| info.port_name.clone()))
}

/// One line of the `--list` output.
pub fn describe_port(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let marker = if is_sportident(info) { " (SPORTident)" } else { "" };
            format!("{} [{:04x}:{:04x}]{}", info.port_name, usb.vid, usb.pid, marker)
        }
        _ => info.port_name.clone(),
    }
}

#[cfg(test)]
mod test_port {
    use super::*;
    use tokio_serial::UsbPortInfo;

    fn usb_port(vid: u16, pid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    #[test]
    fn test_sportident_marker() {
        let station = usb_port(SPORTIDENT_VID, SPORTIDENT_PID);
        assert_eq!(describe_port(&station), "/dev/ttyUSB0 [10c4:800a] (SPORTident)");
        let other = usb_port(0x0403, 0x6001);
        assert_eq!(describe_port(&other), "/dev/ttyUSB0 [0403:6001]");
    }
}
