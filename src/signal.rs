use crate::machine::Phase;

/// Messages from the session task to the GUI.
pub enum SessionSignal {
    HeartRate { bpm: u16 },
    Phase(Phase),
    SensorFound(String),
}

/// Requests from the GUI to the session task.
pub enum GuiSignal {
    StartWorkout,
    StopWorkout,
}
