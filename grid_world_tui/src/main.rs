use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use grid_world_core::{
    Direction as Heading, Position,
    action::{ActionMode, HighLevelAction, LowLevelAction},
    agent::{Agent, RandomAgent, run_episode},
    config::EngineConfig,
    environment::{Environment, ObservationCode, ResetOptions, StepResult},
    layout::Layout as GridLayout,
    outcome::Outcome,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    Training,
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Keyboard play
    Play,
    /// Watch a random agent play
    Watch,
    /// Run episodes without a terminal UI and log a summary
    Headless,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Layout file to load
    #[arg(short, long, value_name = "LAYOUT_FILE")]
    layout: Option<PathBuf>,
    /// TOML engine configuration, replaces the preset
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
    #[arg(short, long, value_enum, default_value_t = Preset::Interactive)]
    preset: Preset,
    /// Use the high-level action set
    #[arg(long)]
    high_level: bool,
    #[arg(short, long, value_enum, default_value_t = Mode::Play)]
    mode: Mode,
    /// Episodes to run in watch and headless mode
    #[arg(short, long, default_value_t = 10)]
    episodes: u32,
    /// Log destination while the terminal UI is active
    #[arg(long, value_name = "LOG_FILE", default_value = "grid_world.log")]
    log_file: PathBuf,
}

struct App {
    /// The core simulation environment.
    environment: Environment,
    mode: Mode,
    /// Drives the environment in watch mode.
    agent: RandomAgent,
    last_step: Option<StepResult>,
    completed_episodes: u32,
    max_episodes: u32,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(environment: Environment, mode: Mode, seed: u64, max_episodes: u32) -> Self {
        App {
            environment,
            mode,
            agent: RandomAgent::new(seed),
            last_step: None,
            completed_episodes: 0,
            max_episodes,
            should_quit: false,
        }
    }

    /// Handles one step of the simulation in watch mode.
    fn tick(&mut self) -> Result<()> {
        if self.mode != Mode::Watch {
            return Ok(());
        }
        if self.environment.is_finished() {
            if self.completed_episodes < self.max_episodes {
                self.reset()?;
            }
            return Ok(());
        }
        if let Some(code) = self.agent.next_action(&self.environment) {
            self.step(code)?;
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode) -> Result<()> {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('r') => self.reset()?,
            _ if self.mode == Mode::Play && !self.environment.is_finished() => {
                if let Some(code) = action_code(key, self.environment.action_mode()) {
                    self.step(code)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn step(&mut self, code: usize) -> Result<()> {
        let result = self.environment.step(code)?;
        if result.terminated || result.truncated {
            self.completed_episodes += 1;
        }
        self.last_step = Some(result);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.environment.reset(ResetOptions::default())?;
        self.last_step = None;
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Maps a key to an action code of the active mode.
fn action_code(key: KeyCode, mode: ActionMode) -> Option<usize> {
    match mode {
        ActionMode::LowLevel => {
            let action = match key {
                KeyCode::Char('w') | KeyCode::Up => LowLevelAction::Move(Heading::Up),
                KeyCode::Char('s') | KeyCode::Down => LowLevelAction::Move(Heading::Down),
                KeyCode::Char('a') | KeyCode::Left => LowLevelAction::Move(Heading::Left),
                KeyCode::Char('d') | KeyCode::Right => LowLevelAction::Move(Heading::Right),
                KeyCode::Char(' ') => LowLevelAction::Attack,
                _ => return None,
            };
            Some(action.into())
        }
        ActionMode::HighLevel => match key {
            KeyCode::Char(c @ '1'..='5') => {
                let code = c.to_digit(10)? as usize - 1;
                (code < HighLevelAction::COUNT).then_some(code)
            }
            _ => None,
        },
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_logging(args.mode, &args.log_file)?;

    // If no layout file is provided, use the default level
    let layout_file = args
        .layout
        .clone()
        .unwrap_or(PathBuf::from("levels/level01.txt"));
    let environment = load_environment(&args, &layout_file)?;
    tracing::debug!("Layout:\n{}", environment.layout());
    tracing::info!(
        layout = %layout_file.display(),
        goal = ?environment.layout().goal(),
        mode = ?args.mode,
        action_mode = %environment.action_mode(),
        seed = args.seed,
        "Environment loaded"
    );

    if args.mode == Mode::Headless {
        return run_headless(environment, args.seed, args.episodes);
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Create the application state
    let mut app = App::new(environment, args.mode, args.seed, args.episodes);

    // Run the main application loop, restoring the terminal even on error
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    result
}

fn init_logging(mode: Mode, log_file: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("grid_world=debug,info"));

    // The terminal UI owns stdout, so everything but headless logs to a file.
    if mode == Mode::Headless {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("setting default subscriber failed")?;
    } else {
        let file = File::create(log_file)
            .with_context(|| format!("Failed to create log file {}", log_file.display()))?;
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("setting default subscriber failed")?;
    }
    Ok(())
}

fn load_environment(args: &Args, layout_file: &Path) -> Result<Environment> {
    let text = std::fs::read_to_string(layout_file)
        .with_context(|| format!("Failed to read layout file {}", layout_file.display()))?;
    let layout = text
        .parse::<GridLayout>()
        .with_context(|| format!("Failed to parse layout file {}", layout_file.display()))?;

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str::<EngineConfig>(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => match args.preset {
            Preset::Training => EngineConfig::training(),
            Preset::Interactive => EngineConfig::interactive(),
        },
    };
    if args.high_level {
        config.action_mode = ActionMode::HighLevel;
    }

    Environment::new(layout, config, args.seed).context("Failed to create environment")
}

/// Plays `episodes` episodes with a random agent and logs a summary.
fn run_headless(mut environment: Environment, seed: u64, episodes: u32) -> Result<()> {
    let mut agent = RandomAgent::new(seed);
    let mut successes = 0;
    let mut total_reward = 0.0;

    for episode in 1..=episodes {
        if episode > 1 {
            environment.reset(ResetOptions::default())?;
        }
        run_episode(&mut environment, &mut agent)?;

        let stats = environment.stats();
        if stats.outcome == Some(Outcome::Success) {
            successes += 1;
        }
        total_reward += stats.total_reward;
        tracing::info!(
            episode,
            outcome = stats.outcome.map_or("none", Outcome::as_str),
            steps = stats.steps,
            score = stats.score,
            reward = stats.total_reward,
            kills = stats.kills,
            pickups = stats.pickups,
            level = environment.curriculum().level(),
            "Episode complete"
        );
    }

    let mean_reward = if episodes == 0 {
        0.0
    } else {
        total_reward / f64::from(episodes)
    };
    tracing::info!(episodes, successes, mean_reward, "Headless run finished");
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code)?;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the map
            Constraint::Percentage(20), // Area for episode stats
            Constraint::Percentage(10), // Area for help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.environment);
    render_stats(frame, main_layout[1], app);

    let help = match (app.mode, app.environment.action_mode()) {
        (Mode::Play, ActionMode::LowLevel) => {
            "w/a/s/d move, space attack, 'r' reset, 'q' or 'Esc' quit."
        }
        (Mode::Play, ActionMode::HighLevel) => {
            "1 goal, 2 reward, 3 safety, 4 attack, 5 enemy, 'r' reset, 'q' or 'Esc' quit."
        }
        _ => "Watching a random agent. 'r' reset, 'q' or 'Esc' quit.",
    };
    let help_text = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders the counters of the current episode and the curriculum.
fn render_stats(frame: &mut Frame, area: Rect, app: &App) {
    let environment = &app.environment;
    let stats = environment.stats();
    let curriculum = environment.curriculum();

    let status = match stats.outcome {
        Some(Outcome::Success) => Span::styled("success", Style::default().fg(Color::Green).bold()),
        Some(outcome) => Span::styled(outcome.as_str(), Style::default().fg(Color::Red).bold()),
        None => Span::raw("running"),
    };
    let last_reward = app
        .last_step
        .as_ref()
        .map_or(String::from("-"), |step| format!("{:+.2}", step.reward));

    let items = vec![
        ListItem::from(Line::from(vec![
            Span::raw(format!("Score: {:.0}  ", stats.score)),
            Span::raw(format!("Return: {:.2}  ", stats.total_reward)),
            Span::raw(format!("Last reward: {last_reward}  ")),
            Span::raw("Status: "),
            status,
        ])),
        ListItem::new(format!(
            "Steps: {}  Kills: {}  Pickups: {}  Hazard hits: {}  Wall hits: {}",
            stats.steps, stats.kills, stats.pickups, stats.hazard_hits, stats.wall_hits
        )),
        ListItem::new(format!(
            "Mode: {}  Level: {}  Streak: {}  Successes: {}  Emptiness: {:.2}  Episodes: {}",
            environment.action_mode(),
            curriculum.level(),
            curriculum.streak(),
            curriculum.total_successes(),
            environment.emptiness(),
            app.completed_episodes,
        )),
    ];

    let stats_widget =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Episode"));
    frame.render_widget(stats_widget, area);
}

/// Renders the grid onto the frame.
fn render_map(frame: &mut Frame, area: Rect, environment: &Environment) {
    let rows = environment.layout().rows();
    let cols = environment.layout().cols();
    let attacked = environment.attack_highlight();

    let mut lines: Vec<Line> = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut spans: Vec<Span> = Vec::with_capacity(cols);
        for col in 0..cols {
            let position = Position::new(row, col);
            let mut span = cell_span(environment.cell_code(position));
            if attacked.contains(&position) {
                span = span.bg(Color::Yellow);
            }
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Grid World").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

fn cell_span(code: ObservationCode) -> Span<'static> {
    match code {
        ObservationCode::Empty => Span::raw(" "),
        ObservationCode::Agent => Span::styled("@", Style::default().fg(Color::Cyan).bold()),
        ObservationCode::Goal => Span::styled("G", Style::default().fg(Color::Green).bold()),
        ObservationCode::Hazard => Span::styled("^", Style::default().fg(Color::Magenta)),
        ObservationCode::Bonus => Span::styled("$", Style::default().fg(Color::Yellow)),
        ObservationCode::Wall => Span::styled("#", Style::default().fg(Color::DarkGray)),
        ObservationCode::Rubble => Span::styled("%", Style::default().fg(Color::Gray)),
        ObservationCode::Enemy => Span::styled("M", Style::default().fg(Color::Red).bold()),
        ObservationCode::Danger => Span::styled("!", Style::default().fg(Color::Red)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_the_active_action_set() {
        assert_eq!(action_code(KeyCode::Char('d'), ActionMode::LowLevel), Some(3));
        assert_eq!(action_code(KeyCode::Char(' '), ActionMode::LowLevel), Some(4));
        assert_eq!(action_code(KeyCode::Char('1'), ActionMode::LowLevel), None);
        assert_eq!(action_code(KeyCode::Char('1'), ActionMode::HighLevel), Some(0));
        assert_eq!(action_code(KeyCode::Char('5'), ActionMode::HighLevel), Some(4));
        assert_eq!(action_code(KeyCode::Char('w'), ActionMode::HighLevel), None);
    }

    #[test]
    fn bundled_levels_parse() {
        for level in ["levels/level01.txt", "levels/level02.txt"] {
            let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(level);
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(text.parse::<GridLayout>().is_ok(), "{level}");
        }
    }

    #[test]
    fn bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/dense.toml");
        let text = std::fs::read_to_string(path).unwrap();
        let config: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.emptiness, 0.2);
    }
}
