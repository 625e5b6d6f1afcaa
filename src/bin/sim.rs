//! Sprout 링크 시뮬레이터
//!
//! 가상 시간(밀리초)에서 병목 링크를 흉내내고 컨트롤러가 정한 윈도우만큼
//! 데이터그램을 보낸다. 손실은 없고 병목 큐 지연만 존재한다.
//!
//! 사용법:
//!   cargo run --release --bin sprout-sim -- [OPTIONS]
//!
//! 예시:
//!   # 300 packets/sec 링크, 10초
//!   cargo run --release --bin sprout-sim -- --rate 300 --duration 10
//!
//!   # 5초 시점에 용량이 80 packets/sec 로 하락, Poisson 전달
//!   cargo run --release --bin sprout-sim -- --rate 400 --drop-at 5 --drop-rate 80 --poisson

use std::collections::VecDeque;
use std::path::PathBuf;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Exp;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use sprout::{Config, Controller, MemorySink, NullSink, TracingSink};

/// 시뮬레이션 설정
struct SimConfig {
    /// 링크 용량 (packets/sec)
    rate: f64,
    /// 용량 변경 시점 (초)
    drop_at: Option<f64>,
    /// 변경 후 용량
    drop_rate: f64,
    /// 왕복 전파 지연 (밀리초)
    rtt_ms: u64,
    duration_s: f64,
    /// 전달 기회를 Poisson 과정으로 생성
    poisson: bool,
    seed: u64,
    report_interval_ms: u64,
    config_path: Option<PathBuf>,
    debug: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rate: 200.0,
            drop_at: None,
            drop_rate: 50.0,
            rtt_ms: 40,
            duration_s: 5.0,
            poisson: false,
            seed: 42,
            report_interval_ms: 500,
            config_path: None,
            debug: false,
        }
    }
}

fn parse_args() -> Result<SimConfig, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = SimConfig::default();

    let value = |i: usize| -> Result<&str, Box<dyn std::error::Error>> {
        args.get(i + 1)
            .map(|s| s.as_str())
            .ok_or_else(|| format!("{} 값 필요", args[i]).into())
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rate" | "-r" => {
                config.rate = value(i)?.parse()?;
                i += 1;
            }
            "--drop-at" => {
                config.drop_at = Some(value(i)?.parse()?);
                i += 1;
            }
            "--drop-rate" => {
                config.drop_rate = value(i)?.parse()?;
                i += 1;
            }
            "--rtt" => {
                config.rtt_ms = value(i)?.parse()?;
                i += 1;
            }
            "--duration" | "-d" => {
                config.duration_s = value(i)?.parse()?;
                i += 1;
            }
            "--seed" => {
                config.seed = value(i)?.parse()?;
                i += 1;
            }
            "--report" => {
                config.report_interval_ms = value(i)?.parse()?;
                i += 1;
            }
            "--config" | "-c" => {
                config.config_path = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--poisson" => config.poisson = true,
            "--debug" => config.debug = true,
            "--help" | "-h" => {
                println!(
                    r#"Sprout 링크 시뮬레이터

옵션:
  -r, --rate <PPS>        링크 용량 packets/sec (기본: 200)
      --drop-at <SEC>     용량 변경 시점
      --drop-rate <PPS>   변경 후 용량 (기본: 50)
      --rtt <MS>          왕복 전파 지연 (기본: 40)
  -d, --duration <SEC>    시뮬레이션 길이 (기본: 5)
      --poisson           Poisson 전달 과정 사용
      --seed <N>          난수 시드 (기본: 42)
      --report <MS>       보고 주기 (기본: 500)
  -c, --config <FILE>     컨트롤러 설정 TOML
      --debug             컨트롤러 이벤트 출력 (RUST_LOG=debug 필요)
  -h, --help              도움말
"#
                );
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    Ok(config)
}

/// 병목 링크: 전달 기회마다 큐 앞의 패킷 하나를 내보냄
struct Link {
    rate: f64,
    poisson: bool,
    /// Poisson 모드의 전달 간격 분포
    gaps: Option<Exp>,
    /// 다음 전달 기회 시각 (밀리초, 소수)
    next_opportunity: f64,
    /// (seq, send_time, 링크 도착 시각)
    queue: VecDeque<(u64, u64, u64)>,
}

impl Link {
    fn new(rate: f64, poisson: bool) -> Self {
        let mut link = Self {
            rate,
            poisson,
            gaps: None,
            next_opportunity: 0.0,
            queue: VecDeque::new(),
        };
        link.set_rate(rate);
        link
    }

    /// 용량 변경, Poisson 모드면 간격 분포도 다시 생성
    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        self.gaps = if self.poisson {
            Exp::new(rate / 1000.0).ok()
        } else {
            None
        };
    }

    fn interval_ms(&self, rng: &mut StdRng) -> f64 {
        if self.rate <= 0.0 {
            return f64::INFINITY;
        }
        match &self.gaps {
            // 지수 분포 간격 (rate 는 packets/ms)
            Some(exp) => exp.sample(rng),
            None => 1000.0 / self.rate,
        }
    }

    /// 시각 `now` 까지 전달된 패킷 (seq, send_time, recv_time)
    fn deliver(&mut self, now: u64, rng: &mut StdRng, out: &mut Vec<(u64, u64, u64)>) {
        while self.next_opportunity <= now as f64 {
            let at = self.next_opportunity;
            self.next_opportunity += self.interval_ms(rng);
            match self.queue.front() {
                Some(&(seq, sent, arrive)) if (arrive as f64) <= at => {
                    self.queue.pop_front();
                    out.push((seq, sent, at.ceil() as u64));
                }
                _ => {}
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let sim = parse_args()?;
    let config = match &sim.config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    info!("Sprout simulator starting...");
    info!(
        "Link: {:.1} pps, rtt {}ms, {:.1}s, {}",
        sim.rate,
        sim.rtt_ms,
        sim.duration_s,
        if sim.poisson { "poisson" } else { "constant" }
    );
    if let Some(at) = sim.drop_at {
        info!("Capacity change at {:.1}s -> {:.1} pps", at, sim.drop_rate);
    }

    let events = MemorySink::new();
    let mut controller = if sim.debug {
        Controller::with_config(config, Box::new(TracingSink))?
    } else if sim.report_interval_ms > 0 {
        Controller::with_config(config, Box::new(events.clone()))?
    } else {
        Controller::with_config(config, Box::new(NullSink))?
    };

    let mut rng = StdRng::seed_from_u64(sim.seed);
    let mut link = Link::new(sim.rate, sim.poisson);
    let one_way = sim.rtt_ms / 2;
    let start = 1000u64;
    let end = start + (sim.duration_s * 1000.0) as u64;

    let mut next_seq = 1u64;
    let mut acked = 0u64;
    let mut delivered = Vec::new();
    // (ack 도착 시각, seq, send_time, recv_time)
    let mut pending_acks: VecDeque<(u64, u64, u64, u64)> = VecDeque::new();

    let mut window_sum = 0u64;
    let mut delay_sum = 0u64;
    let mut acks_in_report = 0u64;
    let mut next_report = start + sim.report_interval_ms;

    for now in start..end {
        if let Some(at) = sim.drop_at {
            if now == start + (at * 1000.0) as u64 {
                link.set_rate(sim.drop_rate);
                info!("t={}ms capacity -> {:.1} pps", now - start, sim.drop_rate);
            }
        }

        while let Some(&(at, seq, sent, recv)) = pending_acks.front() {
            if at > now {
                break;
            }
            pending_acks.pop_front();
            controller.ack_received(seq, sent, recv, now);
            acked = acked.max(seq);
            delay_sum += now - sent;
            acks_in_report += 1;
        }

        let window = controller.window_size() as u64;
        window_sum += window;
        while next_seq - 1 - acked < window {
            controller.datagram_was_sent(next_seq, now);
            link.queue.push_back((next_seq, now, now + one_way));
            next_seq += 1;
        }

        link.deliver(now, &mut rng, &mut delivered);
        for (seq, sent, recv) in delivered.drain(..) {
            pending_acks.push_back((recv + one_way, seq, sent, recv));
        }

        if sim.report_interval_ms > 0 && now >= next_report {
            let rate = controller.estimate().map(|e| e.forward_rate).unwrap_or(0.0);
            let avg_delay = if acks_in_report > 0 {
                delay_sum as f64 / acks_in_report as f64
            } else {
                0.0
            };
            info!(
                "t={:>6}ms window={:>4} (avg {:>6.1}) forecast={:>7.1}pps throughput={:>6.1}pps delay={:>6.1}ms timeout={}ms queue={}",
                now - start,
                controller.window_size(),
                window_sum as f64 / sim.report_interval_ms as f64,
                rate,
                acks_in_report as f64 * 1000.0 / sim.report_interval_ms as f64,
                avg_delay,
                controller.timeout_ms(),
                link.queue.len(),
            );
            debug!("{} controller events in interval", events.drain().len());
            window_sum = 0;
            delay_sum = 0;
            acks_in_report = 0;
            next_report += sim.report_interval_ms;
        }
    }

    info!("Simulation complete");
    info!("{}", controller.stats().summary());
    Ok(())
}
