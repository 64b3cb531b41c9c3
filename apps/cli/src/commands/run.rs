//! run 命令
//!
//! 按固定周期驱动一个仿真 ECU：接收 → bus-off 检测 → 应用 → 发送。
//! bus-off 恢复策略在这里实现（停止后重新启动控制器），通信栈本身只负责报告。

use anyhow::{Context, Result, bail};
use clap::Args;
use ecucom_can::{CanError, CanFrame, CanHardware, CanId, MockHardware};
use ecucom_stack::{EcuStack, SignalType, SignalValue, StackConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// 每隔多少个周期输出一次指标
const METRICS_EVERY: u64 = 100;

/// 仿真 ECU 运行参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 栈配置文件
    #[arg(short, long)]
    pub config: PathBuf,

    /// CAN 接口（覆盖配置）
    #[arg(short, long)]
    pub interface: Option<String>,

    /// 周期（毫秒）
    #[arg(long, default_value_t = 10)]
    pub period_ms: u64,

    /// 运行的周期数，未指定时一直运行到 Ctrl-C
    #[arg(long)]
    pub cycles: Option<u64>,

    /// 使用内存回环硬件代替 SocketCAN
    #[arg(long)]
    pub mock: bool,

    /// 每个周期递增的 U8 心跳信号
    #[arg(long)]
    pub heartbeat: Option<u8>,

    /// 启动时写入的信号，格式 ID=VALUE，可重复
    #[arg(long = "set", value_parser = parse_assignment)]
    pub set: Vec<(u8, i64)>,
}

fn parse_assignment(input: &str) -> Result<(u8, i64), String> {
    let (id, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{}'", input))?;
    let id = id
        .trim()
        .parse()
        .map_err(|e| format!("invalid signal id '{}': {}", id, e))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value '{}': {}", value, e))?;
    Ok((id, value))
}

/// 把整数转换为信号配置要求的类型
fn typed_value(signal_type: SignalType, value: i64) -> Result<SignalValue> {
    let typed = match signal_type {
        SignalType::U8 => SignalValue::U8(u8::try_from(value)?),
        SignalType::U16 => SignalValue::U16(u16::try_from(value)?),
        SignalType::S16 => SignalValue::S16(i16::try_from(value)?),
        SignalType::Bool => SignalValue::Bool(value != 0),
    };
    Ok(typed)
}

/// 内存回环：发送的帧在下一次接收时原样返回
#[derive(Debug, Default)]
struct Loopback(MockHardware);

impl CanHardware for Loopback {
    fn init(&mut self, baudrate: u32) -> Result<(), CanError> {
        self.0.init(baudrate)
    }

    fn start(&mut self) {
        self.0.start()
    }

    fn stop(&mut self) {
        self.0.stop()
    }

    fn transmit(&mut self, id: CanId, data: &[u8]) -> Result<(), CanError> {
        self.0.transmit(id, data)?;
        self.0.loopback();
        Ok(())
    }

    fn receive(&mut self) -> Option<CanFrame> {
        self.0.receive()
    }

    fn is_bus_off(&self) -> bool {
        self.0.is_bus_off()
    }

    fn error_counters(&self) -> (u8, u8) {
        self.0.error_counters()
    }
}

impl RunCommand {
    pub async fn execute(&self) -> Result<()> {
        let config = StackConfig::load(&self.config)
            .with_context(|| format!("加载配置失败: {}", self.config.display()))?;

        if self.mock {
            info!("Using in-memory loopback hardware");
            let ecu = EcuStack::new(Loopback::default(), config)?;
            return self.run_loop(ecu).await;
        }

        self.run_socketcan(config).await
    }

    #[cfg(target_os = "linux")]
    async fn run_socketcan(&self, config: StackConfig) -> Result<()> {
        use ecucom_can::SocketCanHardware;

        let hardware = match self.interface.as_ref().or(config.interface.as_ref()) {
            Some(iface) => SocketCanHardware::new(iface.clone()),
            None => SocketCanHardware::from_env(),
        };
        info!("Opening SocketCAN interface '{}'", hardware.interface());

        let ecu = EcuStack::new(hardware, config)?;
        self.run_loop(ecu).await
    }

    #[cfg(not(target_os = "linux"))]
    async fn run_socketcan(&self, _config: StackConfig) -> Result<()> {
        bail!("SocketCAN is only available on Linux; use --mock")
    }

    async fn run_loop<H: CanHardware>(&self, mut ecu: EcuStack<H>) -> Result<()> {
        if self.period_ms == 0 {
            bail!("--period-ms must be greater than 0");
        }

        for &(id, value) in &self.set {
            let current = ecu.receive_signal(id)?;
            let typed = typed_value(current.signal_type(), value)
                .with_context(|| format!("value {} does not fit signal {}", value, id))?;
            ecu.send_signal(id, typed)?;
        }

        ecu.start()?;
        info!(
            "ECU '{}' started, period {} ms",
            ecu.name(),
            self.period_ms
        );

        let mut interval = tokio::time::interval(Duration::from_millis(self.period_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut last_seen: Vec<Option<SignalValue>> = Vec::new();
        let mut heartbeat: u8 = 0;
        let mut cycle: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {},
                _ = &mut ctrl_c => {
                    info!("Interrupted, stopping");
                    break;
                },
            }

            ecu.main_function_read();
            ecu.main_function_bus_off();

            if ecu.take_bus_off_notification() {
                warn!("Bus-off detected, restarting controller");
                ecu.stop()?;
                ecu.start()?;
            }

            log_signal_changes(&ecu, &mut last_seen);

            if let Some(id) = self.heartbeat {
                ecu.send_signal(id, heartbeat)?;
                heartbeat = heartbeat.wrapping_add(1);
            }

            ecu.main_function_tx();
            cycle += 1;

            if cycle % METRICS_EVERY == 0 {
                info!("cycle {}: {}", cycle, ecu.metrics().snapshot());
            }
            if self.cycles.is_some_and(|limit| cycle >= limit) {
                break;
            }
        }

        ecu.stop()?;
        println!("📊 {} cycles, {}", cycle, ecu.metrics().snapshot());
        Ok(())
    }
}

fn log_signal_changes<H: CanHardware>(ecu: &EcuStack<H>, last_seen: &mut Vec<Option<SignalValue>>) {
    let mut id: u8 = 0;
    while let Ok(value) = ecu.receive_signal(id) {
        let index = usize::from(id);
        if last_seen.len() <= index {
            last_seen.resize(index + 1, None);
        }
        if last_seen[index] != Some(value) {
            info!("signal {} = {}", id, value);
            last_seen[index] = Some(value);
        }
        match id.checked_add(1) {
            Some(next) => id = next,
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("3=-12"), Ok((3, -12)));
        assert_eq!(parse_assignment(" 1 = 200 "), Ok((1, 200)));
        assert!(parse_assignment("1").is_err());
        assert!(parse_assignment("x=1").is_err());
    }

    #[test]
    fn test_typed_value_range() {
        assert_eq!(typed_value(SignalType::U8, 255).unwrap(), SignalValue::U8(255));
        assert!(typed_value(SignalType::U8, 256).is_err());
        assert_eq!(typed_value(SignalType::S16, -2).unwrap(), SignalValue::S16(-2));
        assert_eq!(typed_value(SignalType::Bool, 5).unwrap(), SignalValue::Bool(true));
    }

    #[test]
    fn test_loopback_returns_sent_frames() {
        let mut hw = Loopback::default();
        hw.transmit(0x100, &[1, 2]).unwrap();
        let frame = hw.receive().unwrap();
        assert_eq!(frame.id, 0x100);
        assert_eq!(frame.data_slice(), &[1, 2]);
    }
}
