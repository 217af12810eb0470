fn main() {
    visit_relay::run();
}
