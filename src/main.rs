use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn};
use rand::Rng;
use ratatui::{
    prelude::*,
    style::{Style, Stylize},
    widgets::*,
};
use simplelog::{Config, LevelFilter, WriteLogger};
use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::time::{Duration, Instant};

const ARENA: Size = Size {
    width: 40,
    height: 30,
};
const INITIAL_SNEK_LENGTH: u16 = 3;
const MOVE_INTERVAL: Duration = Duration::from_millis(150);
const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const MORSEL_SCORE: u16 = 10;
const MORSELS_FOR_LEVEL_2: u16 = 5;
const BLOCKADE_SIDE: u16 = 3;
const MORSEL_SAMPLE_LIMIT: u32 = 256;
const MORSEL_PULSE: Duration = Duration::from_millis(300);
const BANNER_DURATION: Duration = Duration::from_millis(1500);
const LEADERBOARD: [(&str, u16); 3] = [("Player A", 150), ("Player B", 120), ("Player C", 90)];
const LOG_FILE: &str = "snekcade.log";

fn main() -> Result<(), io::Error> {
    // Set up logging before anything else
    WriteLogger::init(
        LevelFilter::Info,
        Config::default(),
        File::create(LOG_FILE)?,
    )
    .expect("Failed to initialize logger");

    info!("Starting snekcade");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut game = Game::new();

    // Frames run faster than the movement cadence; Game::on_frame gates the
    // actual movement steps to MOVE_INTERVAL.
    loop {
        terminal.draw(|f| game.render(f))?;

        if event::poll(FRAME_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                game.handle_input(key);
            }
        }

        game.on_frame(Instant::now());

        if let GameState::Exit = game.state {
            break;
        }
    }

    // Cleanup terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    info!("Leaving snekcade");

    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Size {
    width: u16,
    height: u16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Pos {
    x: u16,
    y: u16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PosDelta {
    x: i32,
    y: i32,
}

impl From<Direction> for PosDelta {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::North => PosDelta { x: 0, y: -1 },
            Direction::South => PosDelta { x: 0, y: 1 },
            Direction::East => PosDelta { x: 1, y: 0 },
            Direction::West => PosDelta { x: -1, y: 0 },
        }
    }
}

impl Pos {
    /// None when the offset position leaves the arena. The walls are lethal,
    /// so there is no wraparound.
    fn checked_add(&self, delta: PosDelta, bounds: Size) -> Option<Pos> {
        let new_x = self.x as i32 + delta.x;
        let new_y = self.y as i32 + delta.y;
        if new_x < 0 || new_x >= bounds.width as i32 || new_y < 0 || new_y >= bounds.height as i32 {
            return None;
        }
        Some(Pos {
            x: new_x as u16,
            y: new_y as u16,
        })
    }
}

/// The snek keeps two direction slots: `heading` is what the last movement
/// step actually used, `wanted` is the latest key request. Reversal checks
/// run against `heading`, so two quick key presses inside one movement
/// window cannot smuggle in a 180 degree turn.
#[derive(Debug)]
struct Snek {
    head: Pos,
    body: VecDeque<Pos>,
    heading: Direction,
    wanted: Direction,
}

impl Default for Snek {
    fn default() -> Self {
        Self::new(Size::default(), 0)
    }
}

impl Snek {
    fn new(size: Size, initial_length: u16) -> Self {
        let head = Pos {
            x: size.width / 2,
            y: size.height / 2,
        };

        // Body extends west of the head, front of the deque is the tail.
        let mut body = VecDeque::new();
        for i in 1..initial_length {
            body.push_front(Pos {
                x: head.x - i,
                y: head.y,
            });
        }

        Snek {
            head,
            body,
            heading: Direction::East,
            wanted: Direction::East,
        }
    }

    fn steer(&mut self, new_direction: Direction) {
        if new_direction.opposite() != self.heading {
            self.wanted = new_direction;
        }
    }

    fn slither(&mut self, new_head: Pos) {
        self.body.push_back(self.head);
        self.head = new_head;
        self.body.pop_front();
    }

    /// Duplicates the tail cell. The copy stays put on the next step while
    /// the rest of the body slides forward, which is what makes the growth
    /// visible one step after eating.
    fn grow(&mut self) {
        let tail = self.body.front().copied().unwrap_or(self.head);
        self.body.push_front(tail);
    }

    fn would_collide_with_body(&self, pos: Pos) -> bool {
        self.body.contains(&pos)
    }

    fn would_collide_with_head(&self, pos: Pos) -> bool {
        self.head == pos
    }
}

/// Static 3x3 obstacle, materialized once at the level 2 transition.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Blockade {
    origin: Pos,
}

impl Blockade {
    fn centered(arena: Size) -> Blockade {
        Blockade {
            origin: Pos {
                x: (arena.width - BLOCKADE_SIDE) / 2,
                y: (arena.height - BLOCKADE_SIDE) / 2,
            },
        }
    }

    /// Axis-aligned overlap between the unit cell at `pos` and the blockade
    /// square: the intervals must intersect on both axes.
    fn blocks(&self, pos: Pos) -> bool {
        pos.x + 1 > self.origin.x
            && pos.x < self.origin.x + BLOCKADE_SIDE
            && pos.y + 1 > self.origin.y
            && pos.y < self.origin.y + BLOCKADE_SIDE
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Crash {
    Wall,
    Body,
    Blockade,
}

/// What a movement step did, for the loop and the presentation layer to
/// react to. The step itself touches no rendering state.
#[derive(Debug, PartialEq)]
enum StepResult {
    Ongoing,
    Nommed { score: u16, leveled_up: bool },
    Crashed(Crash),
    /// No free cell left to respawn the morsel into.
    Filled,
}

#[derive(Debug, Default)]
struct SnekPit {
    size: Size,
    snek: Snek,
    morsel: Pos,
    blockade: Option<Blockade>,
    score: u16,
    morsels_eaten: u16,
    level: u8,
}

impl SnekPit {
    fn new(size: Size, initial_length: u16, rng: &mut impl Rng) -> Self {
        let mut pit = SnekPit {
            size,
            snek: Snek::new(size, initial_length),
            morsel: Pos::default(),
            blockade: None,
            score: 0,
            morsels_eaten: 0,
            level: 1,
        };
        // A fresh pit always has room
        if let Some(pos) = pit.spawn_morsel(rng) {
            pit.morsel = pos;
        }
        pit
    }

    fn steer(&mut self, new_direction: Direction) {
        self.snek.steer(new_direction);
    }

    /// One gated movement step. Collisions are decided on the candidate head
    /// position before anything moves, so a crashed snek freezes in place.
    fn slither_on(&mut self, rng: &mut impl Rng) -> StepResult {
        self.snek.heading = self.snek.wanted;

        let delta = self.snek.heading.into();
        let Some(candidate) = self.snek.head.checked_add(delta, self.size) else {
            return StepResult::Crashed(Crash::Wall);
        };
        // The tail has not vacated its cell yet, so it counts too
        if self.snek.would_collide_with_body(candidate) {
            return StepResult::Crashed(Crash::Body);
        }
        if let Some(blockade) = &self.blockade {
            if blockade.blocks(candidate) {
                return StepResult::Crashed(Crash::Blockade);
            }
        }

        self.snek.slither(candidate);

        if self.snek.head == self.morsel {
            self.score += MORSEL_SCORE;
            self.morsels_eaten += 1;
            self.snek.grow();

            let leveled_up = self.level == 1 && self.morsels_eaten >= MORSELS_FOR_LEVEL_2;
            if leveled_up {
                self.level = 2;
                self.blockade = Some(Blockade::centered(self.size));
            }

            // The blockade goes up before the morsel moves, so a level 2
            // morsel can never land inside it
            match self.spawn_morsel(rng) {
                Some(pos) => self.morsel = pos,
                None => return StepResult::Filled,
            }

            return StepResult::Nommed {
                score: self.score,
                leveled_up,
            };
        }

        StepResult::Ongoing
    }

    fn cell_is_free(&self, pos: Pos) -> bool {
        !self.snek.would_collide_with_head(pos)
            && !self.snek.would_collide_with_body(pos)
            && self.blockade.map_or(true, |blockade| !blockade.blocks(pos))
    }

    /// Reject-and-resample with a bound: a handful of uniform throws, then an
    /// exhaustive scan once the board is crowded enough that throws keep
    /// missing. None only when no free cell exists at all.
    fn spawn_morsel(&self, rng: &mut impl Rng) -> Option<Pos> {
        for _ in 0..MORSEL_SAMPLE_LIMIT {
            let pos = Pos {
                x: rng.gen_range(0..self.size.width),
                y: rng.gen_range(0..self.size.height),
            };
            if self.cell_is_free(pos) {
                return Some(pos);
            }
        }

        let free: Vec<Pos> = (0..self.size.height)
            .flat_map(|y| (0..self.size.width).map(move |x| Pos { x, y }))
            .filter(|&pos| self.cell_is_free(pos))
            .collect();
        if free.is_empty() {
            None
        } else {
            Some(free[rng.gen_range(0..free.len())])
        }
    }
}

#[derive(Debug)]
enum GameState {
    Landing,
    Playing(SnekPit),
    Paused(SnekPit),
    GameOver { pit: SnekPit, final_score: u16 },
    Exit,
}

/// Transient "Level 2!" splash, drawn until its deadline passes.
#[derive(Debug)]
struct Banner {
    text: String,
    until: Instant,
}

struct Game {
    state: GameState,
    last_step: Instant,
    banner: Option<Banner>,
    morsel_pulse: Option<Instant>,
}

impl Game {
    fn new() -> Self {
        Game {
            state: GameState::Landing,
            last_step: Instant::now(),
            banner: None,
            morsel_pulse: None,
        }
    }

    fn handle_input(&mut self, key: event::KeyEvent) {
        use event::KeyCode;

        let new_state = match &mut self.state {
            GameState::Landing => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Some(GameState::Exit),
                KeyCode::Char(' ') => {
                    let mut rng = rand::thread_rng();
                    let pit = SnekPit::new(ARENA, INITIAL_SNEK_LENGTH, &mut rng);
                    info!("New game started");
                    self.last_step = Instant::now();
                    self.banner = None;
                    self.morsel_pulse = None;
                    Some(GameState::Playing(pit))
                }
                _ => None,
            },
            GameState::Playing(pit) => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Some(GameState::Exit),
                KeyCode::Char(' ') => {
                    info!("Paused at score {}", pit.score);
                    Some(GameState::Paused(std::mem::take(pit)))
                }
                KeyCode::Up | KeyCode::Char('w') => {
                    pit.steer(Direction::North);
                    None
                }
                KeyCode::Down | KeyCode::Char('s') => {
                    pit.steer(Direction::South);
                    None
                }
                KeyCode::Left | KeyCode::Char('a') => {
                    pit.steer(Direction::West);
                    None
                }
                KeyCode::Right | KeyCode::Char('d') => {
                    pit.steer(Direction::East);
                    None
                }
                _ => None,
            },
            GameState::Paused(pit) => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Some(GameState::Exit),
                KeyCode::Char(' ') => {
                    info!("Resumed");
                    self.last_step = Instant::now();
                    Some(GameState::Playing(std::mem::take(pit)))
                }
                _ => None,
            },
            GameState::GameOver { .. } => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Some(GameState::Exit),
                KeyCode::Char(' ') => Some(GameState::Landing),
                _ => None,
            },
            GameState::Exit => None,
        };

        if let Some(new_state) = new_state {
            self.state = new_state;
        }
    }

    /// Called once per frame. Expires transient effects, then performs a
    /// movement step if MOVE_INTERVAL has passed and the game is live.
    fn on_frame(&mut self, now: Instant) {
        if self.banner.as_ref().is_some_and(|b| now >= b.until) {
            self.banner = None;
        }
        if self.morsel_pulse.is_some_and(|until| now >= until) {
            self.morsel_pulse = None;
        }

        if now.duration_since(self.last_step) < MOVE_INTERVAL {
            return;
        }

        if let GameState::Playing(pit) = &mut self.state {
            self.last_step = now;
            let mut rng = rand::thread_rng();
            match pit.slither_on(&mut rng) {
                StepResult::Ongoing => {}
                StepResult::Nommed { score, leveled_up } => {
                    info!("Morsel nommed, score now {}", score);
                    self.morsel_pulse = Some(now + MORSEL_PULSE);
                    if leveled_up {
                        info!("Level 2 reached, blockade raised");
                        self.banner = Some(Banner {
                            text: String::from("Level 2!"),
                            until: now + BANNER_DURATION,
                        });
                    }
                }
                StepResult::Crashed(crash) => {
                    let final_score = pit.score;
                    info!("Game over ({:?}), final score {}", crash, final_score);
                    let pit = std::mem::take(pit);
                    self.state = GameState::GameOver { pit, final_score };
                }
                StepResult::Filled => {
                    let final_score = pit.score;
                    warn!("Arena filled up, ending the run at score {}", final_score);
                    let pit = std::mem::take(pit);
                    self.state = GameState::GameOver { pit, final_score };
                }
            }
        }
    }

    fn render(&self, frame: &mut Frame) {
        let title_text = match &self.state {
            GameState::Playing(pit) | GameState::Paused(pit) => {
                format!("SNEKCADE    Score: {}    Level: {}", pit.score, pit.level)
            }
            GameState::GameOver { final_score, .. } => {
                format!("SNEKCADE    Final Score: {}", final_score)
            }
            _ => String::from("SNEKCADE"),
        };

        let size = frame.area();
        let layout = Layout::default()
            .direction(layout::Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title + score line
                Constraint::Min(0),    // Game area
            ])
            .split(size);

        frame.render_widget(
            Paragraph::new(title_text)
                .alignment(Alignment::Left)
                .block(Block::default().borders(Borders::ALL)),
            layout[0],
        );

        match &self.state {
            GameState::Landing => {
                let mut lines = vec![
                    String::new(),
                    String::from("S N E K C A D E"),
                    String::new(),
                    String::from("Leaderboard:"),
                ];
                for (name, score) in LEADERBOARD {
                    lines.push(format!("{}: {}", name, score));
                }
                lines.push(String::new());
                lines.push(String::from("Press SPACE to start"));

                frame.render_widget(
                    Paragraph::new(lines.join("\n"))
                        .alignment(Alignment::Center)
                        .block(Block::default().borders(Borders::ALL)),
                    layout[1],
                );
            }
            GameState::Playing(pit) => {
                let block = Block::default().title("Playing").borders(Borders::ALL);
                let inner_area = block.inner(layout[1]);

                frame.render_widget(block, layout[1]);
                frame.render_widget(
                    PitView {
                        pit,
                        pulse: self.morsel_pulse.is_some(),
                    },
                    inner_area,
                );

                if let Some(banner) = &self.banner {
                    frame.render_widget(
                        Paragraph::new(banner.text.clone().bold().yellow())
                            .alignment(Alignment::Center),
                        centered_band(inner_area),
                    );
                }
            }
            GameState::Paused(pit) => {
                let block = Block::default()
                    .title("Paused. Press SPACE to continue")
                    .borders(Borders::ALL);
                let inner_area = block.inner(layout[1]);

                frame.render_widget(block, layout[1]);
                frame.render_widget(PitView { pit, pulse: false }, inner_area);
            }
            GameState::GameOver { pit, final_score } => {
                let block = Block::default().borders(Borders::ALL);
                let inner_area = block.inner(layout[1]);

                frame.render_widget(block, layout[1]);
                frame.render_widget(PitView { pit, pulse: false }, inner_area);
                frame.render_widget(
                    Paragraph::new(format!(
                        "GAME OVER\nFinal Score: {}\nPress SPACE for the menu",
                        final_score
                    ))
                    .style(Style::default().fg(Color::LightRed))
                    .alignment(Alignment::Center),
                    inner_area,
                );
            }
            GameState::Exit => {}
        }
    }
}

/// Single middle row of `area`, for the level banner.
fn centered_band(area: Rect) -> Rect {
    Rect::new(
        area.x,
        area.y + area.height / 2,
        area.width,
        area.height.min(1),
    )
}

struct PitView<'a> {
    pit: &'a SnekPit,
    pulse: bool,
}

impl Widget for PitView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // The arena is fixed-size, the terminal is not; clip instead of
        // indexing outside the buffer
        let cell_at = |pos: Pos| {
            if pos.x < area.width && pos.y < area.height {
                Some((area.x + pos.x, area.y + pos.y))
            } else {
                None
            }
        };

        if let Some(blockade) = &self.pit.blockade {
            for dy in 0..BLOCKADE_SIDE {
                for dx in 0..BLOCKADE_SIDE {
                    let pos = Pos {
                        x: blockade.origin.x + dx,
                        y: blockade.origin.y + dy,
                    };
                    if let Some(cell) = cell_at(pos) {
                        buf[cell].set_symbol(" ").set_bg(Color::DarkGray);
                    }
                }
            }
        }

        for pos in &self.pit.snek.body {
            if let Some(cell) = cell_at(*pos) {
                buf[cell].set_symbol(" ").set_bg(Color::Green);
            }
        }

        if let Some(cell) = cell_at(self.pit.snek.head) {
            buf[cell]
                .set_symbol("@")
                .set_fg(Color::Yellow)
                .set_bg(Color::Green);
        }

        if let Some(cell) = cell_at(self.pit.morsel) {
            if self.pulse {
                buf[cell]
                    .set_symbol("●")
                    .set_fg(Color::White)
                    .set_bg(Color::Red);
            } else {
                buf[cell].set_symbol("●").set_fg(Color::LightRed);
            }
        }
    }
}
