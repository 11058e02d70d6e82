use console::Style;
use varreg_core::config::RegistrationConfig;
use varreg_core::pipeline::RegistrationOutput;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_registration_summary(config: &RegistrationConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Variational Registration"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(24)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Fixed"),
        s.path.apply_to(config.fixed.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Moving"),
        s.path.apply_to(config.moving.display())
    );
    match config.mask {
        Some(ref mask) => println!(
            "  {:<14}{}",
            s.label.apply_to("Mask"),
            s.path.apply_to(mask.display())
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Mask"),
            s.disabled.apply_to("none")
        ),
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.display())
    );
    println!();

    println!("  {}", s.header.apply_to("Force"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Gradient"),
        s.method.apply_to(config.force.gradient_type)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(config.force.intensity_difference_threshold)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Time step"),
        s.value.apply_to(config.force.time_step)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Spacing"),
        s.value
            .apply_to(format!("{} x {}", config.spacing.x, config.spacing.y))
    );
    println!();

    println!("  {}", s.header.apply_to("Schedule"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Levels"),
        s.value.apply_to(config.schedule.levels)
    );
    let iterations: Vec<usize> = (0..config.schedule.levels)
        .map(|level| config.schedule.iterations_for_level(level))
        .collect();
    println!(
        "    {:<12}{:?}",
        s.label.apply_to("Iterations"),
        iterations
    );
    match config.schedule.rms_change_threshold {
        Some(t) => println!(
            "    {:<12}{}",
            s.label.apply_to("RMS stop"),
            s.value.apply_to(t)
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("RMS stop"),
            s.disabled.apply_to("disabled")
        ),
    }
    println!();
}

pub fn print_registration_result(config: &RegistrationConfig, output: &RegistrationOutput) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Levels"),
        s.value.apply_to(output.elapsed_levels)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Metric"),
        s.value.apply_to(format!(
            "{:.6} -> {:.6}",
            output.initial_metric, output.final_metric
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Max shift"),
        s.value.apply_to(format!("{:.3}", output.max_displacement))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Saved"),
        s.path.apply_to(config.output.display())
    );
    if let Some(ref path) = config.field_output {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Field"),
            s.path.apply_to(path.display())
        );
    }
    println!();
}
