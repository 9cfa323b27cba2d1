//! 配置处理基准测试
//!
//! 测试配置解析、验证和序列化的性能

use criterion::{criterion_group, criterion_main, Criterion};
use fleet_vitals::config::{validate_config, Config, GlobalConfig};
use fleet_vitals::monitor::HostRow;
use std::hint::black_box;

fn config_processing_benchmark(c: &mut Criterion) {
    c.bench_function("config_serialization", |b| {
        let config = create_test_config(100);

        b.iter(|| {
            let toml = toml::to_string(&config).unwrap();
            black_box(toml)
        });
    });

    c.bench_function("config_deserialization", |b| {
        let toml_str = toml::to_string(&create_test_config(100)).unwrap();

        b.iter(|| {
            let config: Config = toml::from_str(&toml_str).unwrap();
            black_box(config)
        });
    });

    c.bench_function("config_validation", |b| {
        let config = create_test_config(500);

        b.iter(|| {
            let result = validate_config(black_box(&config));
            black_box(result)
        });
    });
}

/// 创建包含 `hosts` 台主机的测试配置，一半使用主机名地址
fn create_test_config(hosts: usize) -> Config {
    Config {
        global: GlobalConfig {
            probe_name_prefixes: vec!["DP".to_string(), "CDN77".to_string()],
            ..Default::default()
        },
        hosts: (0..hosts)
            .map(|i| {
                let primary = if i % 2 == 0 {
                    format!("10.{}.{}.1", i / 256, i % 256)
                } else {
                    format!("node-{i}.dc1.example.com")
                };
                HostRow::new(format!("DP-{i:04}"), primary, format!("bmc-{i}.example.com"))
            })
            .collect(),
    }
}

criterion_group!(benches, config_processing_benchmark);
criterion_main!(benches);
