use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use portal_proveedores::{is_paid_shipment, MonthlyGroup, PricedPlate, Shipment};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PAGE_JUMP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Months,
    Shipments,
    Plates,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Months => Page::Shipments,
            Page::Shipments => Page::Plates,
            Page::Plates => Page::Months,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Months => Page::Plates,
            Page::Shipments => Page::Months,
            Page::Plates => Page::Shipments,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Months => "Meses",
            Page::Shipments => "Envíos",
            Page::Plates => "Placas",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Paid,
    Pending,
}

impl StatusFilter {
    fn label(&self) -> &str {
        match self {
            StatusFilter::All => "Todos",
            StatusFilter::Paid => "Pagados",
            StatusFilter::Pending => "Pendientes",
        }
    }

    fn accepts(&self, shipment: &Shipment) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Paid => is_paid_shipment(shipment),
            StatusFilter::Pending => !is_paid_shipment(shipment),
        }
    }
}

/// Scrollable table selection shared by the three pages
fn step(state: &mut TableState, len: usize, delta: isize, wrap: bool) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let last = len as isize - 1;
    let target = current + delta;
    let i = if wrap {
        if target > last {
            0
        } else if target < 0 {
            last
        } else {
            target
        }
    } else {
        target.clamp(0, last)
    };
    state.select(Some(i as usize));
}

pub struct App {
    pub scope_label: String,
    pub groups: Vec<MonthlyGroup>,
    pub plates: Vec<PricedPlate>,
    pub filtered_shipments: Vec<Shipment>,
    pub status_filter: StatusFilter,
    pub current_page: Page,
    pub months_state: TableState,
    pub shipments_state: TableState,
    pub plates_state: TableState,
    pub show_detail: bool,
}

impl App {
    pub fn new(scope_label: String, groups: Vec<MonthlyGroup>, plates: Vec<PricedPlate>) -> Self {
        let mut app = Self {
            scope_label,
            groups,
            plates,
            filtered_shipments: Vec::new(),
            status_filter: StatusFilter::All,
            current_page: Page::Months,
            months_state: TableState::default(),
            shipments_state: TableState::default(),
            plates_state: TableState::default(),
            show_detail: false,
        };

        if !app.groups.is_empty() {
            app.months_state.select(Some(0));
        }
        if !app.plates.is_empty() {
            app.plates_state.select(Some(0));
        }
        app.apply_filter(StatusFilter::All);
        app
    }

    /// Shipments in group order (newest month first), narrowed by status
    pub fn apply_filter(&mut self, filter: StatusFilter) {
        self.status_filter = filter;
        self.filtered_shipments = self
            .groups
            .iter()
            .flat_map(|g| g.shipments.iter())
            .filter(|s| filter.accepts(s))
            .cloned()
            .collect();

        if self.filtered_shipments.is_empty() {
            self.shipments_state.select(None);
        } else {
            self.shipments_state.select(Some(0));
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_shipment(&self) -> Option<&Shipment> {
        self.shipments_state
            .selected()
            .and_then(|i| self.filtered_shipments.get(i))
    }

    /// Jump from the month table to that month's first shipment
    pub fn open_selected_month(&mut self) {
        let key = match self.months_state.selected().and_then(|i| self.groups.get(i)) {
            Some(group) => group.month_key.clone(),
            None => return,
        };

        self.apply_filter(StatusFilter::All);
        let first = self
            .filtered_shipments
            .iter()
            .position(|s| s.date.format("%Y-%m").to_string() == key);
        self.shipments_state.select(first);
        self.current_page = Page::Shipments;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Months => (&mut self.months_state, self.groups.len()),
            Page::Shipments => (&mut self.shipments_state, self.filtered_shipments.len()),
            Page::Plates => (&mut self.plates_state, self.plates.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        step(state, len, 1, true);
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        step(state, len, -1, true);
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_table();
        step(state, len, PAGE_JUMP as isize, false);
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active_table();
        step(state, len, -(PAGE_JUMP as isize), false);
    }

    pub fn totals(&self) -> (f64, f64, f64) {
        self.groups.iter().fold((0.0, 0.0, 0.0), |acc, g| {
            (acc.0 + g.total_billed, acc.1 + g.total_paid, acc.2 + g.total_pending)
        })
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter if app.current_page == Page::Months => app.open_selected_month(),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('1') if app.current_page == Page::Shipments => app.apply_filter(StatusFilter::All),
                KeyCode::Char('2') if app.current_page == Page::Shipments => app.apply_filter(StatusFilter::Paid),
                KeyCode::Char('3') if app.current_page == Page::Shipments => app.apply_filter(StatusFilter::Pending),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => {
                    let (state, len) = app.active_table();
                    step(state, len, -(len as isize), false);
                }
                KeyCode::End => {
                    let (state, len) = app.active_table();
                    step(state, len, len as isize, false);
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Shipments {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_shipments(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Months => render_months(f, chunks[1], app),
            Page::Shipments => render_shipments(f, chunks[1], app),
            Page::Plates => render_plates(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn bordered(title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title)
}

fn highlight() -> Style {
    Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let (billed, paid, pending) = app.totals();

    let mut tab_spans = vec![];
    for (i, page) in [Page::Months, Page::Shipments, Page::Plates].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(app.scope_label.clone(), Style::default().fg(Color::White)));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(format!("Facturado {:.2}", billed), Style::default().fg(Color::White)));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(format!("Pagado {:.2}", paid), Style::default().fg(Color::Green)));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(format!("Pendiente {:.2}", pending), Style::default().fg(Color::Red)));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_months(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.groups.iter().map(|g| {
        let pending_color = if g.total_pending > 0.0 { Color::Red } else { Color::Green };
        Row::new(vec![
            Cell::from(g.month_display.clone()),
            Cell::from(format!("{}", g.shipment_count())),
            Cell::from(format!("{:.2}", g.total_billed)),
            Cell::from(format!("{:.2}", g.total_paid)).style(Style::default().fg(Color::Green)),
            Cell::from(format!("{:.2}", g.total_pending)).style(Style::default().fg(pending_color)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["Mes", "Envíos", "Facturado", "Pagado", "Pendiente"]))
    .block(bordered(" Envíos por mes ".to_string()))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.months_state);
}

fn render_shipments(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.filtered_shipments.iter().map(|s| {
        let paid = is_paid_shipment(s);
        let color = if paid { Color::Green } else { Color::Red };
        Row::new(vec![
            Cell::from(s.date.to_string()),
            Cell::from(truncate(&s.recipient, 28)),
            Cell::from(truncate(&s.description, 30)),
            Cell::from(format!("{:.2}", s.total_cost.unwrap_or(0.0))).style(Style::default().fg(color)),
            Cell::from(s.payment_status.clone().unwrap_or_else(|| "—".to_string()))
                .style(Style::default().fg(color)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(30),
            Constraint::Length(32),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Fecha", "Destinatario", "Descripción", "Total", "Estado"]))
    .block(bordered(format!(" Envíos ({}) ", app.status_filter.label())))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.shipments_state);
}

fn render_plates(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.plates.iter().map(|p| {
        let (price, color) = match p.unit_price {
            Some(price) => (format!("{:.2}", price), Color::White),
            None => ("sin precio".to_string(), Color::DarkGray),
        };
        Row::new(vec![
            Cell::from(truncate(&p.plate.description, 30)),
            Cell::from(format!("{} x {}", p.plate.width, p.plate.height)),
            Cell::from(truncate(&p.plate.recipient, 28)),
            Cell::from(price).style(Style::default().fg(color)),
            Cell::from(p.currency.clone().unwrap_or_default()),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(16),
            Constraint::Length(30),
            Constraint::Length(14),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["Descripción", "Medida", "Proveedor", "Costo/placa", "Moneda"]))
    .block(bordered(" Placas con costos ".to_string()))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.plates_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (state, total) = match app.current_page {
        Page::Months => (&app.months_state, app.groups.len()),
        Page::Shipments => (&app.shipments_state, app.filtered_shipments.len()),
        Page::Plates => (&app.plates_state, app.plates.len()),
    };
    let selected = state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Fila: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    let hints: &[(&str, &str)] = match app.current_page {
        Page::Months => &[("Enter", " Ver envíos | ")],
        Page::Shipments => &[("Enter", " Detalle | "), ("1/2/3", " Todos/Pagados/Pendientes | ")],
        Page::Plates => &[],
    };

    status_spans.push(Span::raw(" | "));
    for (key, text) in hints {
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(*text));
    }
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Página | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Mover | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Salir"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let shipment = match app.selected_shipment() {
        Some(s) => s,
        None => {
            f.render_widget(Paragraph::new("Sin selección").block(bordered(" Detalle ".to_string())), area);
            return;
        }
    };

    let label = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(vec![Span::styled("ID: ", label), Span::raw(shipment.id.to_string())]),
        Line::from(vec![Span::styled("Fecha: ", label), Span::raw(shipment.date.to_string())]),
        Line::from(vec![Span::styled("Destinatario: ", label), Span::raw(shipment.recipient.clone())]),
        Line::from(vec![Span::styled("Descripción: ", label), Span::raw(shipment.description.clone())]),
        Line::from(vec![
            Span::styled("Total: ", label),
            Span::raw(shipment.total_cost.map(|c| format!("{:.2}", c)).unwrap_or_else(|| "—".to_string())),
        ]),
        Line::from(vec![
            Span::styled("Estado: ", label),
            Span::raw(shipment.payment_status.clone().unwrap_or_else(|| "—".to_string())),
        ]),
    ];

    if !shipment.metadata.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Otros datos", label)));
        let mut keys: Vec<&String> = shipment.metadata.keys().collect();
        keys.sort();
        for key in keys {
            lines.push(Line::from(format!("  {}: {}", key, shipment.metadata[key])));
        }
    }

    f.render_widget(Paragraph::new(lines).block(bordered(" Detalle ".to_string())), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
