//! Recording of particle movements and braiding progress.
//!
//! Every committed move produces a [`MovementRecord`] and one
//! [`StateRecord`] per vertex of its path. Braid sequences also report the
//! braid line order after every exchange and the final particle positions.
//! Records are handed to a [`Recorder`]; [`CsvRecorder`] writes them as CSV
//! tables and [`MemoryRecorder`] keeps them in memory.

use std::io;

use derive_more::{Display, Error, From};
use itertools::Itertools;
use smol_str::SmolStr;

use crate::gate::BraidPair;
use crate::nanowire::{ParticleId, Positions};
use crate::voltage::{VoltageGate, Voltages};

/// The logging target for general events.
pub const LOG_TARGET: &str = "tqc::log";
/// The logging target for progress events. More verbose than the general log.
pub const PROGRESS_TARGET: &str = "tqc::progress";
/// The logging target for function spans.
pub const METRICS_TARGET: &str = "tqc::metrics";

/// A particle moved along a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovementRecord {
    /// The pair being braided.
    pub pair: BraidPair,
    /// The particle that moved.
    pub particle: ParticleId,
    /// The vertices crossed, both ends included.
    pub path: Vec<SmolStr>,
    /// Voltage gates after the move.
    pub voltages: Voltages,
}

/// Snapshot of the particle positions while a particle crosses a vertex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateRecord {
    /// The pair being braided.
    pub pair: BraidPair,
    /// Positions of every particle.
    pub positions: Positions,
    /// Voltage gates after the move.
    pub voltages: Voltages,
}

/// Order of the braid lines after an exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRecord {
    /// The pair just exchanged.
    pub pair: BraidPair,
    /// Braid line held by every particle, in particle order.
    pub lines: Vec<usize>,
}

/// Sink for braiding records.
pub trait Recorder {
    /// Record a committed movement.
    fn record_movement(&mut self, record: &MovementRecord) -> Result<(), RecordError>;

    /// Record the positions while the moving particle crosses a vertex.
    fn record_state(&mut self, record: &StateRecord) -> Result<(), RecordError>;

    /// Record the braid line order.
    fn record_line(&mut self, record: &LineRecord) -> Result<(), RecordError>;

    /// Record the particle positions at the end of a gate.
    fn record_final_positions(&mut self, positions: &Positions) -> Result<(), RecordError>;
}

/// Keeps every record in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryRecorder {
    /// Movement records, in order.
    pub movements: Vec<MovementRecord>,
    /// State records, in order.
    pub states: Vec<StateRecord>,
    /// Braid line records, in order.
    pub lines: Vec<LineRecord>,
    /// Final positions of every gate, in order.
    pub final_positions: Vec<Positions>,
}

impl MemoryRecorder {
    /// Movements of a single particle.
    pub fn movements_of(&self, particle: ParticleId) -> impl Iterator<Item = &MovementRecord> {
        self.movements.iter().filter(move |m| m.particle == particle)
    }
}

impl Recorder for MemoryRecorder {
    fn record_movement(&mut self, record: &MovementRecord) -> Result<(), RecordError> {
        self.movements.push(record.clone());
        Ok(())
    }

    fn record_state(&mut self, record: &StateRecord) -> Result<(), RecordError> {
        self.states.push(record.clone());
        Ok(())
    }

    fn record_line(&mut self, record: &LineRecord) -> Result<(), RecordError> {
        self.lines.push(record.clone());
        Ok(())
    }

    fn record_final_positions(&mut self, positions: &Positions) -> Result<(), RecordError> {
        self.final_positions.push(positions.clone());
        Ok(())
    }
}

type CsvSink<'w> = csv::Writer<Box<dyn io::Write + 'w>>;

/// Writes records as CSV tables.
///
/// Four tables are produced:
/// - movements: `Par1,Par2,Particle,Path,Vg11,...`, the path joined with `-`,
/// - states: `Par1,Par2,P1,...,Pn,Vg11,...`,
/// - lines: `Par1,Par2,P1,...,Pn`,
/// - positions: one headerless row of position names per gate.
///
/// Every record is flushed as soon as it is written.
pub struct CsvRecorder<'w> {
    movements: CsvSink<'w>,
    states: CsvSink<'w>,
    lines: CsvSink<'w>,
    positions: CsvSink<'w>,
}

impl<'w> CsvRecorder<'w> {
    /// Create a recorder and write the table headers.
    pub fn new(
        movements: impl io::Write + 'w,
        states: impl io::Write + 'w,
        lines: impl io::Write + 'w,
        positions: impl io::Write + 'w,
        particles: usize,
        gates: usize,
    ) -> Result<Self, RecordError> {
        fn sink<'w>(w: impl io::Write + 'w) -> CsvSink<'w> {
            let boxed: Box<dyn io::Write + 'w> = Box::new(w);
            csv::WriterBuilder::new().flexible(true).from_writer(boxed)
        }
        let mut recorder = Self {
            movements: sink(movements),
            states: sink(states),
            lines: sink(lines),
            positions: sink(positions),
        };

        let pair = ["Par1".to_string(), "Par2".to_string()];
        let particle_cols = (1..=particles).map(|p| format!("P{p}")).collect_vec();
        let gate_cols = (0..gates).map(|g| VoltageGate::new(g).header()).collect_vec();

        let movement_header = pair
            .iter()
            .cloned()
            .chain(["Particle".to_string(), "Path".to_string()])
            .chain(gate_cols.iter().cloned());
        write_row(&mut recorder.movements, movement_header)?;
        let state_header = pair
            .iter()
            .chain(&particle_cols)
            .chain(&gate_cols)
            .cloned();
        write_row(&mut recorder.states, state_header)?;
        let line_header = pair.iter().chain(&particle_cols).cloned();
        write_row(&mut recorder.lines, line_header)?;
        Ok(recorder)
    }
}

fn write_row<I>(sink: &mut CsvSink<'_>, row: I) -> Result<(), RecordError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    sink.write_record(row)?;
    sink.flush()?;
    Ok(())
}

fn pair_fields(pair: BraidPair) -> [String; 2] {
    [pair.0.to_string(), pair.1.to_string()]
}

fn voltage_fields(voltages: &Voltages) -> impl Iterator<Item = String> + '_ {
    voltages.iter().map(|v| v.to_string())
}

impl Recorder for CsvRecorder<'_> {
    fn record_movement(&mut self, record: &MovementRecord) -> Result<(), RecordError> {
        let row = pair_fields(record.pair)
            .into_iter()
            .chain([record.particle.to_string(), record.path.iter().join("-")])
            .chain(voltage_fields(&record.voltages));
        write_row(&mut self.movements, row)
    }

    fn record_state(&mut self, record: &StateRecord) -> Result<(), RecordError> {
        let row = pair_fields(record.pair)
            .into_iter()
            .chain(record.positions.iter().map(|p| p.to_string()))
            .chain(voltage_fields(&record.voltages));
        write_row(&mut self.states, row)
    }

    fn record_line(&mut self, record: &LineRecord) -> Result<(), RecordError> {
        let row = pair_fields(record.pair)
            .into_iter()
            .chain(record.lines.iter().map(|p| p.to_string()));
        write_row(&mut self.lines, row)
    }

    fn record_final_positions(&mut self, positions: &Positions) -> Result<(), RecordError> {
        write_row(&mut self.positions, positions.iter().map(|p| p.as_str()))
    }
}

/// Records could not be written.
#[derive(Debug, Display, Error, From)]
#[non_exhaustive]
pub enum RecordError {
    /// CSV encoding failed.
    #[display("Unable to write braiding record. {_0}")]
    #[from]
    Csv(csv::Error),
    /// The output could not be written.
    #[display("Unable to write braiding output. {_0}")]
    #[from]
    Io(io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::voltage::GateState;

    #[test]
    fn log_targets() {
        let targets = [LOG_TARGET, PROGRESS_TARGET, METRICS_TARGET];
        assert!(targets.iter().all(|t| t.starts_with("tqc::")));
        assert_eq!(targets.iter().unique().count(), 3);
        // Filters match on prefixes, so no target may shadow another.
        assert!(!targets
            .iter()
            .tuple_combinations()
            .any(|(a, b)| a.starts_with(b) || b.starts_with(a)));
    }

    #[test]
    fn csv_tables() {
        let (mut movements, mut states, mut lines, mut positions) = (vec![], vec![], vec![], vec![]);
        {
            let mut recorder =
                CsvRecorder::new(&mut movements, &mut states, &mut lines, &mut positions, 2, 2).unwrap();
            let mut voltages = Voltages::open(2);
            voltages.set(VoltageGate::new(1), GateState::Shut);
            let pair = BraidPair::new(1, 2);

            recorder
                .record_movement(&MovementRecord {
                    pair,
                    particle: ParticleId::new(2),
                    path: vec!["b".into(), "x1".into(), "d".into()],
                    voltages: voltages.clone(),
                })
                .unwrap();
            recorder
                .record_state(&StateRecord {
                    pair,
                    positions: Positions::new(["a", "x1"]),
                    voltages,
                })
                .unwrap();
            recorder
                .record_line(&LineRecord {
                    pair,
                    lines: vec![2, 1],
                })
                .unwrap();
            recorder
                .record_final_positions(&Positions::new(["b", "a"]))
                .unwrap();
        }

        let text = |b: Vec<u8>| String::from_utf8(b).unwrap();
        assert_eq!(
            text(movements),
            "Par1,Par2,Particle,Path,Vg11,Vg12\n1,2,2,b-x1-d,O,S\n"
        );
        assert_eq!(text(states), "Par1,Par2,P1,P2,Vg11,Vg12\n1,2,a,x1,O,S\n");
        assert_eq!(text(lines), "Par1,Par2,P1,P2\n1,2,2,1\n");
        assert_eq!(text(positions), "b,a\n");
    }
}
