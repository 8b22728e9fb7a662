use crate::{
    components::garden::schedule::{decide, MonthKey, RunDecision, ScheduleConfig},
    devices::{
        hardware::valve_controller::{BrokerConfig, LinkState, ValveController, ValveLink},
        software::weather::{RainGate, WeatherConfig, WeatherGate},
    },
    error::{IrrigationError, Result},
    messages::control::valve::ValveCommand,
};
use chrono::{DateTime, Local, TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    ffi::OsStr,
    fs::File,
    future::Future,
    path::Path,
    str::FromStr,
    time::Duration,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Pause between the first and the repeated close command. The repeat
/// guards against a single dropped message leaving a valve open.
pub const CLOSE_REPEAT_DELAY: Duration = Duration::from_secs(1);

/// Prefix for environment overrides, e.g. `VERDANT_WEATHER__API_KEY`.
const ENV_PREFIX: &str = "VERDANT";

/// One watering zone on the controller box.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq, Debug)]
pub struct ValveConfig {
    /// Number the controller box knows the valve by, 1 and up.
    pub valve_number: u8,
    /// Human readable name, only used in the logs.
    pub alias: String,
    /// Minutes the valve stays open, keyed by month abbreviation.
    pub runtime: BTreeMap<String, u32>,
}

impl ValveConfig {
    /// Valve config with no runtimes yet.
    ///
    /// * `valve_number`: controller box valve number.
    /// * `alias`: name for the logs.
    pub fn new(valve_number: u8, alias: &str) -> Self {
        Self {
            valve_number,
            alias: String::from(alias),
            runtime: BTreeMap::new(),
        }
    }

    /// Set the runtime in minutes for one month.
    pub fn with_runtime(mut self, month: MonthKey, minutes: u32) -> Self {
        self.runtime.insert(month.to_string(), minutes);
        self
    }

    /// How long the valve stays open in `month`, if configured.
    pub fn runtime_for(&self, month: MonthKey) -> Option<Duration> {
        self.runtime
            .iter()
            .find(|(key, _)| MonthKey::from_str(key).ok() == Some(month))
            .map(|(_, minutes)| Duration::from_secs(u64::from(*minutes) * 60))
    }
}

/// Everything one invocation of the controller needs. Read from a yaml file
/// with the same layout as the controller has always used, the `broker` and
/// `weather` sections are optional.
#[derive(Deserialize, Serialize, Clone, PartialEq, Debug)]
pub struct IrrigationConfig {
    /// Hour of day the run starts.
    pub starttime: u32,
    /// Weekday abbreviations a run is allowed on.
    pub weekday: Vec<String>,
    /// Valves in the order they are watered.
    pub valves: Vec<ValveConfig>,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

impl IrrigationConfig {
    /// Irrigation configuration with default broker and weather settings.
    ///
    /// * `starttime`: hour of day [0 - 23]
    /// * `weekday`: weekday abbreviations, i.e. "Mon".
    pub fn new(starttime: u32, weekday: &[&str]) -> Self {
        Self {
            starttime,
            weekday: weekday.iter().map(|day| String::from(*day)).collect(),
            valves: Vec::new(),
            broker: BrokerConfig::default(),
            weather: WeatherConfig::default(),
        }
    }

    /// Append a valve to the watering order.
    pub fn add_valve(mut self, valve: ValveConfig) -> Self {
        self.valves.push(valve);
        self
    }

    /// Read and validate the config stored in a yaml file. Environment
    /// variables prefixed with `VERDANT_` override file values, which is
    /// how the weather api key is normally supplied.
    ///
    /// * `filepath`: path to the config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self> {
        let file = Path::new(&filepath);
        if !file.is_file() {
            return Err(IrrigationError::Config(format!(
                "Could not locate the config file {:?}",
                file
            )));
        }
        let config = config::Config::builder()
            .add_source(config::File::new(
                &file.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        info!("Config read successful");
        Ok(config)
    }

    /// Write the config as pretty printed json with sorted keys. The api
    /// key is never written.
    ///
    /// * `filepath`: output path, truncated if it exists.
    pub fn to_json_file<F: AsRef<OsStr>>(&self, filepath: F) -> Result<()> {
        let file = File::create(Path::new(&filepath))?;
        // Going through `Value` sorts the keys of every object.
        let value = serde_json::to_value(self)?;
        serde_json::to_writer_pretty(file, &value)?;
        Ok(())
    }

    /// Schedule view of the config.
    pub fn schedule(&self) -> Result<ScheduleConfig> {
        if self.starttime > 23 {
            return Err(IrrigationError::Config(format!(
                "starttime {} is not an hour of the day",
                self.starttime
            )));
        }
        let weekdays = self
            .weekday
            .iter()
            .map(|day| {
                Weekday::from_str(day)
                    .map_err(|_| IrrigationError::Config(format!("Unknown weekday {day:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ScheduleConfig::new(self.starttime, weekdays))
    }

    /// Check everything that can be checked without knowing the date.
    pub fn validate(&self) -> Result<()> {
        self.schedule()?;

        let mut seen = HashSet::new();
        for valve in &self.valves {
            if valve.valve_number == 0 {
                return Err(IrrigationError::Config(format!(
                    "Valve {:?} uses number 0, which closes all valves",
                    valve.alias
                )));
            }
            if !seen.insert(valve.valve_number) {
                return Err(IrrigationError::Config(format!(
                    "Valve number {} is used more than once",
                    valve.valve_number
                )));
            }
            if let Some(key) = valve
                .runtime
                .keys()
                .find(|key| MonthKey::from_str(key).is_err())
            {
                return Err(IrrigationError::Config(format!(
                    "Valve {:?} has a runtime for unknown month {key:?}",
                    valve.alias
                )));
            }
        }
        Ok(())
    }
}

/// Unit struct that drives valves one at a time through a link.
pub struct ValveSequencer;

impl ValveSequencer {
    /// Resolve every valve's runtime for `month` before anything is opened,
    /// so a gap in the config cannot leave the run half done.
    ///
    /// * `valves`: valves in watering order.
    /// * `month`: current month.
    pub fn plan(valves: &[ValveConfig], month: MonthKey) -> Result<Vec<(&ValveConfig, Duration)>> {
        valves
            .iter()
            .map(|valve| {
                valve
                    .runtime_for(month)
                    .map(|runtime| (valve, runtime))
                    .ok_or_else(|| {
                        IrrigationError::Config(format!(
                            "Valve {:?} has no runtime for {month}",
                            valve.alias
                        ))
                    })
            })
            .collect()
    }

    /// Water each valve in order: open it, wait its runtime, close all,
    /// wait a second and close all again. Only one valve is ever open.
    ///
    /// * `link`: connected link to the controller box.
    /// * `valves`: valves in watering order.
    /// * `month`: selects each valve's runtime.
    pub async fn run<L: ValveLink>(
        link: &mut L,
        valves: &[ValveConfig],
        month: MonthKey,
    ) -> Result<()> {
        for (valve, runtime) in Self::plan(valves, month)? {
            info!("{}", valve.alias);
            info!(
                "Opening valve # {} for {} minutes",
                valve.valve_number,
                runtime.as_secs() / 60
            );
            link.publish(ValveCommand::Open(valve.valve_number));
            tokio::time::sleep(runtime).await;

            info!("Closing all valves");
            link.publish(ValveCommand::CloseAll);
            tokio::time::sleep(CLOSE_REPEAT_DELAY).await;
            link.publish(ValveCommand::CloseAll);
        }
        Ok(())
    }
}

/// Unit struct for running one invocation of the controller.
pub struct IrrigationController;

impl IrrigationController {
    /// One full invocation against the real weather service and broker.
    ///
    /// * `config`: validated irrigation config.
    /// * `force_now`: run regardless of the schedule, weather still applies.
    pub async fn start(config: &IrrigationConfig, force_now: bool) -> Result<RunDecision> {
        let span = info_span!("run", run_id = %Uuid::new_v4());
        let gate = WeatherGate::new(config.weather.clone());
        let now = Local::now();
        Self::operate(config, &now, force_now, &gate, |broker| async move {
            ValveController::connect(&broker).await
        })
        .instrument(span)
        .await
    }

    /// Schedule check, then weather check, then a connect, the valve
    /// sequence and a disconnect. The link is disconnected on every path
    /// once it has been created. A link that failed to connect aborts the
    /// sequence instead of publishing into nothing.
    ///
    /// * `config`: irrigation config.
    /// * `now`: current local time.
    /// * `force_now`: bypass the weekday/hour check.
    /// * `gate`: rain veto.
    /// * `connect`: opens the link to the controller box.
    pub async fn operate<Tz, G, L, C, Fut>(
        config: &IrrigationConfig,
        now: &DateTime<Tz>,
        force_now: bool,
        gate: &G,
        connect: C,
    ) -> Result<RunDecision>
    where
        Tz: TimeZone,
        G: RainGate,
        L: ValveLink,
        C: FnOnce(BrokerConfig) -> Fut,
        Fut: Future<Output = L>,
    {
        let schedule = config.schedule()?;
        let decision = decide(now, &schedule, force_now);
        if !decision.wants_water() {
            return Ok(decision);
        }

        let month = MonthKey::of(now);
        ValveSequencer::plan(&config.valves, month)?;

        if gate.should_skip_for_rain().await {
            info!("skipped due to rain");
            return Ok(RunDecision::SkipRain);
        }
        info!("good weather");

        let mut link = connect(config.broker.clone()).await;
        let result = if link.state() == LinkState::Connected {
            ValveSequencer::run(&mut link, &config.valves, month).await
        } else {
            Err(IrrigationError::BrokerUnavailable(format!(
                "{}:{}",
                config.broker.address, config.broker.port
            )))
        };
        link.disconnect().await;

        result.map(|()| decision)
    }
}
